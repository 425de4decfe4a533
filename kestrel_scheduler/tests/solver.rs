mod util;

use banananation::FRUIT;
use banananation::activities::*;
use hifitime::TimeUnits;
use kestrel::{Duration, SerializedValue};
use kestrel_scheduler::*;
use util::{activity, problem, seconds, solve, solve_with, starts_of};

fn score(plan: &Plan, goal: GoalId) -> f64 {
    plan.evaluation.get(goal).map_or(f64::NAN, |e| e.score)
}

fn during(interval: Interval) -> WindowsExpression {
    WindowsExpression::Literal(Windows::of(interval, true))
}

#[test]
fn recurrence_fills_every_period() -> anyhow::Result<()> {
    let mut problem = problem(11.seconds());
    let goal = Goal::recurrence(
        "peel",
        RecurrenceGoal::new(ActivityCreationTemplate::of_type(PEEL_BANANA), 2.seconds()),
    );
    let id = goal.id;
    problem.add_goal(goal);

    let plan = solve(problem)?;
    assert_eq!(
        vec![0, 2, 4, 6, 8, 10]
            .into_iter()
            .map(|s: i64| s.seconds())
            .collect::<Vec<_>>(),
        starts_of(&plan, PEEL_BANANA)
    );
    assert_eq!(0.0, score(&plan, id));
    assert_eq!(6, plan.evaluation.get(id).map_or(0, |e| e.inserted().count()));
    Ok(())
}

#[test]
fn candidates_that_overrun_are_discarded() -> anyhow::Result<()> {
    let mut problem = problem(10.seconds());
    let overrun = Goal::cardinality(
        "overrun",
        CardinalityGoal::new(
            ActivityCreationTemplate::of_type(OVERRUN).with_duration(2.seconds()),
        )
        .at_least(1),
    );
    let grow = Goal::cardinality(
        "grow",
        CardinalityGoal::new(
            ActivityCreationTemplate::of_type(GROW_BANANA).with_duration(2.seconds()),
        )
        .at_least(1),
    );
    let (overrun_id, grow_id) = (overrun.id, grow.id);
    problem.set_goals(vec![overrun, grow]);

    let plan = solve(problem)?;
    assert!(starts_of(&plan, OVERRUN).is_empty());
    assert_eq!(-1.0, score(&plan, overrun_id));

    assert_eq!(vec![8.seconds()], starts_of(&plan, GROW_BANANA));
    assert_eq!(0.0, score(&plan, grow_id));
    Ok(())
}

#[test]
fn and_goal_with_an_unsatisfiable_subgoal_rolls_back() -> anyhow::Result<()> {
    let mut problem = problem(11.seconds());
    let peel = Goal::recurrence(
        "peel",
        RecurrenceGoal::new(ActivityCreationTemplate::of_type(PEEL_BANANA), 5.seconds()),
    );
    let overrun = Goal::cardinality(
        "overrun",
        CardinalityGoal::new(
            ActivityCreationTemplate::of_type(OVERRUN).with_duration(1.seconds()),
        )
        .at_least(1),
    );
    let both = Goal::and("both", vec![peel, overrun]).rollback_if_unsatisfied();
    let id = both.id;
    problem.add_goal(both);

    let plan = solve(problem)?;
    assert_eq!(-1.0, score(&plan, id));
    assert!(plan.is_empty());
    assert_eq!(0, plan.evaluation.get(id).map_or(0, |e| e.activities().count()));
    Ok(())
}

#[test]
fn or_goal_keeps_the_subgoal_the_optimizer_prefers() -> anyhow::Result<()> {
    let mut problem = problem(10.seconds());
    let dole = Goal::cardinality(
        "dole",
        CardinalityGoal::new(
            ActivityCreationTemplate::of_type(CHANGE_PRODUCER).with_argument("producer", "Dole"),
        )
        .at_least(1),
    )
    .during(during(seconds(6, 8)));
    let fyffes = Goal::cardinality(
        "fyffes",
        CardinalityGoal::new(
            ActivityCreationTemplate::of_type(CHANGE_PRODUCER)
                .with_argument("producer", "Fyffes"),
        )
        .at_least(1),
    )
    .during(during(seconds(2, 4)));
    let either = Goal::or("either", vec![dole, fyffes], Some(Optimizer::EarliestStart));
    let id = either.id;
    problem.add_goal(either);

    let plan = solve(problem)?;
    let producers: Vec<_> = plan.activities_of_type(CHANGE_PRODUCER).collect();
    assert_eq!(1, producers.len());
    assert_eq!(4.seconds(), producers[0].start_offset);
    assert_eq!(
        Some(&SerializedValue::from("Fyffes")),
        producers[0].arguments.get("producer")
    );
    assert_eq!(0.0, score(&plan, id));
    assert!(plan.evaluation.is_associated(id, producers[0].id));
    Ok(())
}

#[test]
fn coexistence_reassociates_on_a_second_run() -> anyhow::Result<()> {
    let goal = || {
        Goal::coexistence(
            "peel after growing",
            CoexistenceGoal::new(
                CoexistenceAnchor::Activities(ActivityExpression::of_type(GROW_BANANA)),
                ActivityCreationTemplate::of_type(PEEL_BANANA),
            )
            .starts_at(TimeAnchor::End),
        )
    };
    let grow = |start: i64| {
        activity(GROW_BANANA, start.seconds()).with_argument("growingDuration", 1.seconds())
    };

    let mut first = problem(10.seconds());
    first.set_initial_plan([grow(1), grow(4)]);
    first.add_goal(goal());
    let first_plan = solve(first)?;
    assert_eq!(vec![2.seconds(), 5.seconds()], starts_of(&first_plan, PEEL_BANANA));

    let mut second = problem(10.seconds());
    second.set_initial_plan(first_plan.activities().cloned());
    let again = goal();
    let id = again.id;
    second.add_goal(again);
    let second_plan = solve(second)?;

    assert_eq!(first_plan.len(), second_plan.len());
    for (before, after) in first_plan.activities().zip(second_plan.activities()) {
        assert!(before.equals_in_properties(after), "{before:?} != {after:?}");
    }
    let evaluation = second_plan.evaluation.get(id);
    assert_eq!(Some(0), evaluation.map(|e| e.inserted().count()));
    assert_eq!(Some(2), evaluation.map(|e| e.associated().count()));
    assert_eq!(0.0, score(&second_plan, id));
    Ok(())
}

#[test]
fn procedural_goals_respect_resource_constraints() -> anyhow::Result<()> {
    let mut problem = problem(10.seconds());
    problem.set_initial_plan([activity(PEEL_BANANA, 5.seconds()), activity(PEEL_BANANA, 5.seconds())]);
    let goal = Goal::procedural(
        "snacks",
        ProceduralGoal::new(|_| {
            vec![
                activity(BITE_BANANA, 1.seconds()).with_duration(Duration::ZERO),
                activity(BITE_BANANA, 6.seconds()).with_duration(Duration::ZERO),
            ]
        }),
    )
    .constrained_by(WindowsExpression::real(FRUIT, CompareOp::GreaterThan, 2.5));
    let id = goal.id;
    problem.add_goal(goal);

    let plan = solve(problem)?;
    assert_eq!(vec![1.seconds()], starts_of(&plan, BITE_BANANA));
    assert_eq!(-1.0, score(&plan, id));
    Ok(())
}

#[test]
fn rolled_back_goals_score_the_conflicts_left_unresolved() -> anyhow::Result<()> {
    let mut problem = problem(10.seconds());
    problem.set_initial_plan([activity(PEEL_BANANA, 5.seconds()), activity(PEEL_BANANA, 5.seconds())]);
    let goal = Goal::procedural(
        "snacks",
        ProceduralGoal::new(|_| {
            [1, 6, 8]
                .into_iter()
                .map(|s: i64| activity(BITE_BANANA, s.seconds()).with_duration(Duration::ZERO))
                .collect()
        }),
    )
    .constrained_by(WindowsExpression::real(FRUIT, CompareOp::GreaterThan, 2.5))
    .rollback_if_unsatisfied();
    let id = goal.id;
    problem.add_goal(goal);

    let plan = solve(problem)?;
    assert!(starts_of(&plan, BITE_BANANA).is_empty());
    assert_eq!(-2.0, score(&plan, id));
    assert_eq!(Some(Some(3)), plan.evaluation.get(id).map(|e| e.nb_conflicts_detected));
    Ok(())
}

#[test]
fn state_constraints_narrow_placement() -> anyhow::Result<()> {
    let mut problem = problem(10.seconds());
    problem.set_initial_plan([activity(PEEL_BANANA, 4.seconds())]);
    assert!(problem.set_state_constraint(
        BITE_BANANA,
        WindowsExpression::real(FRUIT, CompareOp::GreaterThan, 3.5),
    ));
    assert!(!problem.set_state_constraint("EatBanana", WindowsExpression::Value(true)));
    problem.add_goal(
        Goal::cardinality(
            "bite",
            CardinalityGoal::new(ActivityCreationTemplate::of_type(BITE_BANANA)).at_least(1),
        )
        .during(during(seconds(2, 8))),
    );

    let plan = solve(problem)?;
    let bites = starts_of(&plan, BITE_BANANA);
    assert_eq!(1, bites.len());
    assert!(bites[0] >= 2.seconds() && bites[0] < 4.seconds(), "{:?}", bites[0]);
    Ok(())
}

#[test]
fn mutexed_types_never_overlap() -> anyhow::Result<()> {
    let mut problem = problem(10.seconds());
    problem.set_initial_plan([
        activity(GROW_BANANA, 2.seconds()).with_argument("growingDuration", 4.seconds())
    ]);
    problem.add_global_constraint(ActivityMutex::new(GROW_BANANA, PEEL_BANANA));
    let goal = Goal::cardinality(
        "peel while growing",
        CardinalityGoal::new(ActivityCreationTemplate::of_type(PEEL_BANANA)).at_least(1),
    )
    .during(during(seconds(3, 5)));
    let id = goal.id;
    problem.add_goal(goal);

    let plan = solve(problem)?;
    assert!(starts_of(&plan, PEEL_BANANA).is_empty());
    assert_eq!(-1.0, score(&plan, id));
    Ok(())
}

#[test]
fn analysis_only_counts_conflicts_without_inserting() -> anyhow::Result<()> {
    let mut problem = problem(11.seconds());
    let goal = Goal::recurrence(
        "peel",
        RecurrenceGoal::new(ActivityCreationTemplate::of_type(PEEL_BANANA), 5.seconds()),
    );
    let id = goal.id;
    problem.add_goal(goal);

    let config = SchedulerConfig {
        analysis_only: true,
        ..SchedulerConfig::default()
    };
    let plan = solve_with(problem, config)?;
    assert!(plan.is_empty());
    assert_eq!(-3.0, score(&plan, id));
    Ok(())
}

#[test]
fn parents_bring_their_children_into_the_plan() -> anyhow::Result<()> {
    let mut problem = problem(10.seconds());
    let parent = activity(PARENT, 1.seconds());
    let parent_id = parent.id;
    problem.set_initial_plan([parent]);

    let plan = solve(problem)?;
    assert_eq!(Some(2.seconds()), plan.get(parent_id).and_then(|p| p.duration));
    let children: Vec<_> = plan.activities_of_type(CHILD).collect();
    assert_eq!(2, children.len());
    assert!(children.iter().all(|c| c.top_parent == Some(parent_id)));
    Ok(())
}

#[test]
fn unsimulatable_initial_plans_have_no_solution() -> anyhow::Result<()> {
    let mut problem = problem(10.seconds());
    problem.set_initial_plan([activity("EatBanana", 1.seconds())]);

    let mut solver = PrioritySolver::new(problem);
    assert!(solver.next_solution()?.is_none());
    assert!(solver.next_solution()?.is_none());
    Ok(())
}

#[test]
fn conditional_goals_only_apply_while_the_condition_holds() -> anyhow::Result<()> {
    let mut problem = problem(11.seconds());
    problem.set_initial_plan([activity(BITE_BANANA, 5.seconds()).with_argument("biteSize", 2.0)]);
    let goal = Goal::conditional(
        "peel once the flag is up",
        WindowsExpression::discrete_equals(banananation::FLAG, "B"),
        Goal::recurrence(
            "peel",
            RecurrenceGoal::new(ActivityCreationTemplate::of_type(PEEL_BANANA), 5.seconds()),
        ),
    );
    let id = goal.id;
    problem.add_goal(goal);

    let plan = solve(problem)?;
    assert_eq!(vec![5.seconds(), 10.seconds()], starts_of(&plan, PEEL_BANANA));
    assert_eq!(0.0, score(&plan, id));
    Ok(())
}

#[test]
fn or_goal_without_optimizer_keeps_the_first_satisfied_subgoal() -> anyhow::Result<()> {
    let mut problem = problem(10.seconds());
    let overrun = Goal::cardinality(
        "overrun",
        CardinalityGoal::new(
            ActivityCreationTemplate::of_type(OVERRUN).with_duration(1.seconds()),
        )
        .at_least(1),
    );
    let peel = Goal::cardinality(
        "peel",
        CardinalityGoal::new(ActivityCreationTemplate::of_type(PEEL_BANANA)).at_least(1),
    )
    .during(during(seconds(2, 4)));
    let (overrun_id, peel_id) = (overrun.id, peel.id);
    let either = Goal::or("either", vec![overrun, peel], None);
    let id = either.id;
    problem.add_goal(either);

    let plan = solve(problem)?;
    assert_eq!(vec![4.seconds()], starts_of(&plan, PEEL_BANANA));
    assert_eq!(0.0, score(&plan, id));
    assert_eq!(0.0, score(&plan, peel_id));
    assert_eq!(-1.0, score(&plan, overrun_id));
    Ok(())
}
