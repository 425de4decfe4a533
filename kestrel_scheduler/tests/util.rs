#![allow(dead_code)]

use hifitime::TimeUnits;
use kestrel::{Duration, MissionModel, Time};
use kestrel_scheduler::*;
use once_cell::sync::Lazy;

pub static MODEL: Lazy<MissionModel> = Lazy::new(banananation::model);

pub fn plan_start() -> Time {
    Time::from_gregorian_utc_at_midnight(2025, 1, 1)
}

pub fn horizon(duration: Duration) -> PlanningHorizon {
    PlanningHorizon::starting_at(plan_start(), duration)
}

pub fn problem(duration: Duration) -> Problem {
    Problem::new(MODEL.clone(), horizon(duration))
}

pub fn facade(duration: Duration) -> SimulationFacade {
    SimulationFacade::new(MODEL.clone(), horizon(duration))
}

pub fn solve(problem: Problem) -> anyhow::Result<Plan> {
    solve_with(problem, SchedulerConfig::default())
}

pub fn solve_with(problem: Problem, config: SchedulerConfig) -> anyhow::Result<Plan> {
    PrioritySolver::with_config(problem, config)
        .next_solution()?
        .ok_or_else(|| anyhow::anyhow!("the solver gave no solution"))
}

pub fn activity(type_name: &str, start: Duration) -> SchedulingActivityDirective {
    SchedulingActivityDirective::new(type_name, start, Default::default())
}

pub fn starts_of<'a>(plan: &'a Plan, type_name: &'a str) -> Vec<Duration> {
    plan.activities_of_type(type_name)
        .map(|a| a.start_offset)
        .collect()
}

pub fn seconds(a: i64, b: i64) -> Interval {
    Interval::between(a.seconds(), b.seconds())
}
