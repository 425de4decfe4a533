mod util;

use banananation::activities::*;
use banananation::{FLAG, FRUIT};
use hifitime::TimeUnits;
use kestrel_scheduler::*;
use util::{activity, facade, seconds};

#[test]
fn fruit_above_a_threshold() -> anyhow::Result<()> {
    let mut facade = facade(5.seconds());
    facade.simulate_activities(&[
        activity(PEEL_BANANA, 1.seconds()),
        activity(BITE_BANANA, 2.seconds()).with_argument("biteSize", 0.1),
    ])?;
    let results = facade.compute_simulation_results_until(5.seconds())?;

    let windows = WindowsExpression::real(FRUIT, CompareOp::GreaterThan, 2.9).evaluate(
        &results,
        seconds(0, 5),
        &EvaluationEnvironment::default(),
    )?;
    assert_eq!(Some(true), windows.value_at(0.seconds()));
    assert_eq!(Some(true), windows.value_at(1.5.seconds()));
    assert_eq!(Some(false), windows.value_at(2.seconds()));
    assert_eq!(Some(false), windows.value_at(5.seconds()));
    assert_eq!(None, windows.value_at(6.seconds()));
    Ok(())
}

#[test]
fn discrete_values_and_activity_windows() -> anyhow::Result<()> {
    let mut facade = facade(10.seconds());
    facade.simulate_activities(&[
        activity(BITE_BANANA, 3.seconds()).with_argument("biteSize", 2.0),
        activity(GROW_BANANA, 5.seconds()).with_argument("growingDuration", 2.seconds()),
    ])?;
    let results = facade.compute_simulation_results_until(10.seconds())?;
    let env = EvaluationEnvironment::default();

    let flag_b = WindowsExpression::discrete_equals(FLAG, "B").evaluate(&results, seconds(0, 10), &env)?;
    assert_eq!(Some(false), flag_b.value_at(2.seconds()));
    assert_eq!(Some(true), flag_b.value_at(3.seconds()));

    let growing = WindowsExpression::ActivityWindows(GROW_BANANA.to_string())
        .evaluate(&results, seconds(0, 10), &env)?;
    assert_eq!(vec![seconds(5, 7)], growing.true_intervals().collect::<Vec<_>>());

    let long = WindowsExpression::LongerThan {
        expression: Box::new(WindowsExpression::ActivityWindows(GROW_BANANA.to_string())),
        duration: 3.seconds(),
    }
    .evaluate(&results, seconds(0, 10), &env)?;
    assert!(long.is_all_false());
    Ok(())
}

#[test]
fn unknown_names_are_errors() -> anyhow::Result<()> {
    let mut facade = facade(5.seconds());
    let results = facade.compute_simulation_results_until(5.seconds())?;
    let env = EvaluationEnvironment::default();

    assert_eq!(
        Some(EvaluationError::UnknownResource {
            name: "/bananas".to_string()
        }),
        WindowsExpression::real("/bananas", CompareOp::LessThan, 1.0)
            .evaluate(&results, seconds(0, 5), &env)
            .err()
    );
    assert_eq!(
        Some(EvaluationError::UnboundAlias {
            alias: "anchor".to_string()
        }),
        WindowsExpression::NamedInterval("anchor".to_string())
            .evaluate(&results, seconds(0, 5), &env)
            .err()
    );

    let bound = env.with_interval("anchor", seconds(1, 2));
    let windows = WindowsExpression::NamedInterval("anchor".to_string())
        .evaluate(&results, seconds(0, 5), &bound)?;
    assert_eq!(vec![seconds(1, 2)], windows.true_intervals().collect::<Vec<_>>());
    Ok(())
}
