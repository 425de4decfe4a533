use anyhow::{Context, Result, anyhow};
use banananation::FRUIT;
use banananation::activities::{BITE_BANANA, GROW_BANANA, PEEL_BANANA};
use clap::Parser;
use hifitime::TimeUnits;
use kestrel::Time;
use kestrel_scheduler::{
    ActivityCreationTemplate, ActivityExpression, CoexistenceAnchor, CoexistenceGoal, CompareOp,
    Goal, PlanningHorizon, PrioritySolver, Problem, RecurrenceGoal, ScheduleResults,
    SchedulerConfig, SchedulingActivityDirective, TimeAnchor, WindowsExpression,
};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Schedules a day of banana handling and prints how every goal went.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Plan start, e.g. "2025-01-01T00:00:00 UTC"
    #[arg(long)]
    start: Option<String>,

    /// Horizon length in seconds
    #[arg(long, default_value_t = 3600)]
    horizon: i64,

    /// Seconds between peels
    #[arg(long, default_value_t = 600)]
    peel_every: i64,

    /// Seconds between the GrowBanana activities in the initial plan
    #[arg(long, default_value_t = 900)]
    grow_every: i64,

    /// Scheduler config file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the results as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &args.config {
        Some(path) => SchedulerConfig::from_path(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => SchedulerConfig::default(),
    };
    let start = match &args.start {
        Some(start) => Time::from_str(start).map_err(|e| anyhow!("bad plan start {start:?}: {e}"))?,
        None => Time::from_gregorian_utc_at_midnight(2025, 1, 1),
    };
    if args.horizon <= 0 || args.peel_every <= 0 || args.grow_every <= 0 {
        return Err(anyhow!("horizon and periods must be positive"));
    }

    let horizon = PlanningHorizon::starting_at(start, args.horizon.seconds());
    info!(%horizon, "scheduling");
    let mut problem = Problem::new(banananation::model(), horizon);

    let grow_starts = (0..args.horizon - 60).step_by(args.grow_every as usize);
    problem.set_initial_plan(grow_starts.map(|s| {
        SchedulingActivityDirective::new(GROW_BANANA, s.seconds(), Default::default())
            .with_argument("growingDuration", 60.seconds())
    }));

    problem.add_goal(
        Goal::recurrence(
            "peel regularly",
            RecurrenceGoal::new(
                ActivityCreationTemplate::of_type(PEEL_BANANA),
                args.peel_every.seconds(),
            ),
        )
        .with_priority(1),
    );
    problem.add_goal(
        Goal::coexistence(
            "taste every harvest",
            CoexistenceGoal::new(
                CoexistenceAnchor::Activities(ActivityExpression::of_type(GROW_BANANA)),
                ActivityCreationTemplate::of_type(BITE_BANANA).with_argument("biteSize", 0.5),
            )
            .starts_at(TimeAnchor::End),
        )
        .constrained_by(WindowsExpression::real(FRUIT, CompareOp::GreaterThan, 0.5)),
    );
    let names: Vec<_> = problem
        .goals()
        .iter()
        .map(|g| (g.id, g.name.clone()))
        .collect();

    let plan = PrioritySolver::with_config(problem, config)
        .next_solution()?
        .ok_or_else(|| anyhow!("the initial plan could not be simulated"))?;
    let results = ScheduleResults::from_plan(&plan);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for (id, name) in names {
        if let Some(goal) = results.goals.get(&id) {
            println!(
                "{name}: score {}, {} inserted, {} associated",
                goal.score,
                goal.inserted.len(),
                goal.associated.len()
            );
        }
    }
    println!("\nPlan:");
    for activity in &results.plan {
        println!(
            "  {:>10}  {:<12}  {}",
            horizon.to_time(activity.start_offset),
            activity.type_name,
            activity
                .duration
                .map_or("running".to_string(), |d| d.to_string())
        );
    }
    Ok(())
}
