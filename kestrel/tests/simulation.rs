mod util;

use hifitime::TimeUnits;
use kestrel::*;
use util::{MODEL, activity, at, plan_start, run, schedule};

fn id(n: u64) -> ActivityDirectiveId {
    ActivityDirectiveId(n)
}

#[test]
fn elapsed_points_start_at_zero_and_never_decrease() -> Result<()> {
    let plan = schedule([
        at(1.seconds(), activity("Increment")),
        at(1.seconds(), activity("Increment")),
        at(3.seconds(), activity("Wait").with_argument("duration", 2.seconds())),
        at(4.seconds(), activity("Parent")),
    ]);
    let mut simulation = ResumableSimulation::new(MODEL.clone(), plan_start())?;
    simulation.schedule_directives(&plan, plan_start(), 10.seconds())?;
    simulation.run_until(10.seconds())?;

    let points = simulation.timeline().elapsed_points();
    assert_eq!(Duration::ZERO, points[0]);
    assert!(points.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(10.seconds(), *points.last().unwrap());
    assert_eq!(simulation.timeline().len(), simulation.cells().position());
    Ok(())
}

#[test]
fn commutative_cells_merge_concurrent_writes() -> Result<()> {
    let plan = schedule([
        at(1.seconds(), activity("Increment")),
        at(1.seconds(), activity("Increment").with_argument("amount", 2)),
        at(2.seconds(), activity("Drain").with_argument("amount", 1.5)),
        at(2.seconds(), activity("Drain").with_argument("amount", 2.5)),
    ]);
    let results = run(&plan, 5.seconds())?;

    assert_eq!(Some(&SerializedValue::Int(0)), results.sample_discrete("/count", 0.5.seconds()));
    assert_eq!(Some(&SerializedValue::Int(3)), results.sample_discrete("/count", 1.seconds()));
    assert_eq!(Some(6.0), results.sample_real("/level", 5.seconds()));
    Ok(())
}

#[test]
fn concurrent_register_writes_are_rejected() {
    let plan = schedule([
        at(1.seconds(), activity("SetMode").with_argument("mode", "a")),
        at(1.seconds(), activity("SetMode").with_argument("mode", "b")),
    ]);
    let error = run(&plan, 5.seconds()).unwrap_err();

    assert_eq!(1.seconds(), error.elapsed);
    assert_eq!(plan_start(), error.start);
    match error.source {
        EngineError::ConflictingWrites { cell, tasks, .. } => {
            assert_eq!("/mode", cell);
            assert_eq!(2, tasks.len());
        }
        other => panic!("expected a write conflict, got {other}"),
    }
}

#[test]
fn reading_what_another_task_writes_is_rejected() {
    let plan = schedule([
        at(1.seconds(), activity("ReadMode")),
        at(1.seconds(), activity("SetMode").with_argument("mode", "a")),
    ]);
    let error = run(&plan, 5.seconds()).unwrap_err();
    assert!(matches!(
        error.source,
        EngineError::ReadWriteConflict { ref cell, .. } if cell == "/mode"
    ));
}

#[test]
fn sequential_writes_are_fine() -> Result<()> {
    let plan = schedule([
        at(1.seconds(), activity("SetMode").with_argument("mode", "a")),
        at(2.seconds(), activity("SetMode").with_argument("mode", "b")),
        at(3.seconds(), activity("ReadMode")),
    ]);
    let results = run(&plan, 5.seconds())?;

    let (_, read) = results.span_for_directive(id(3)).unwrap();
    assert_eq!(Some(SerializedValue::from("b")), read.computed_attributes);
    assert_eq!(
        Some(&SerializedValue::from("a")),
        results.sample_discrete("/mode", 1.5.seconds())
    );
    Ok(())
}

#[test]
fn called_children_are_nested_spans() -> Result<()> {
    let plan = schedule([at(2.seconds(), activity("Parent"))]);
    let results = run(&plan, 10.seconds())?;

    let (parent_id, parent) = results.span_for_directive(id(1)).unwrap();
    assert_eq!(2.seconds(), parent.start_offset);
    assert_eq!(Some(2.seconds()), parent.duration);
    assert_eq!(2, parent.children.len());

    let starts: Vec<Duration> = parent
        .children
        .iter()
        .map(|child| results.activities[child].start_offset)
        .collect();
    assert_eq!(vec![2.seconds(), 3.seconds()], starts);
    for child in &parent.children {
        let child = &results.activities[child];
        assert_eq!(Some(parent_id), child.parent);
        assert_eq!(None, child.directive_id);
        assert_eq!(Some(1.seconds()), child.duration);
        assert_eq!(parent_id, results.root_of(parent.children[0]));
    }
    Ok(())
}

#[test]
fn spawned_children_are_nested_spans() -> Result<()> {
    let plan = schedule([at(1.seconds(), activity("Spawner"))]);
    let results = run(&plan, 5.seconds())?;

    let (spawner_id, _) = results.span_for_directive(id(1)).unwrap();
    let child = results
        .activities
        .values()
        .find(|span| span.type_name == "Increment")
        .unwrap();
    assert_eq!(Some(spawner_id), child.parent);
    assert_eq!(1.seconds(), child.start_offset);
    assert_eq!(Some(&SerializedValue::Int(1)), results.sample_discrete("/count", 1.seconds()));
    Ok(())
}

#[test]
fn conditions_wake_tasks_in_the_instant_they_hold() -> Result<()> {
    let plan = schedule([
        at(0.seconds(), activity("WaitForCount").with_argument("target", 2)),
        at(3.seconds(), activity("Increment")),
        at(5.seconds(), activity("Increment")),
    ]);
    let results = run(&plan, 10.seconds())?;

    let (_, waiter) = results.span_for_directive(id(1)).unwrap();
    assert_eq!(Some(5.seconds()), waiter.duration);
    assert_eq!(
        Some(&SerializedValue::from("idle")),
        results.sample_discrete("/mode", 4.seconds())
    );
    assert_eq!(
        Some(&SerializedValue::from("reached")),
        results.sample_discrete("/mode", 5.seconds())
    );
    Ok(())
}

#[test]
fn daemons_run_alongside_the_plan() -> Result<()> {
    let plan = schedule([at(4.seconds(), activity("Increment").with_argument("amount", 10))]);
    let results = run(&plan, 5.seconds())?;

    assert_eq!(
        Some(&SerializedValue::from("full")),
        results.sample_discrete("/mode", 4.seconds())
    );
    Ok(())
}

#[test]
fn task_errors_are_wrapped_with_the_time_they_happened() {
    let plan = schedule([at(5.seconds(), activity("Fail"))]);
    let error = run(&plan, 10.seconds()).unwrap_err();

    assert_eq!(5.seconds(), error.elapsed);
    match error.source {
        EngineError::TaskFailed { cause, time, .. } => {
            assert_eq!(5.seconds(), time);
            assert_eq!("the activity broke", cause.to_string());
        }
        other => panic!("expected a task failure, got {other}"),
    }
}

#[test]
fn negative_delays_are_rejected() {
    let plan = schedule([at(1.seconds(), activity("Rewind"))]);
    let error = run(&plan, 10.seconds()).unwrap_err();
    assert!(matches!(error.source, EngineError::NegativeDelay { .. }));
}

#[test]
fn unknown_activity_types_fail_before_simulating() {
    let plan = schedule([at(1.seconds(), activity("Juggle"))]);
    let error = run(&plan, 10.seconds()).unwrap_err();

    assert_eq!(Duration::ZERO, error.elapsed);
    assert!(matches!(
        error.source,
        EngineError::Instantiation {
            source: InstantiationError::UnknownType { .. }
        }
    ));
}

#[test]
fn anchored_directives_start_relative_to_their_anchors() -> Result<()> {
    let plan = schedule([
        at(1.seconds(), activity("Wait").with_argument("duration", 2.seconds())),
        at(3.seconds(), activity("Increment")).anchored(StartAnchor::DirectiveEnd(id(1))),
        at(1.seconds(), activity("Increment")).anchored(StartAnchor::DirectiveStart(id(1))),
        at((-2).seconds(), activity("Increment")).anchored(StartAnchor::PlanEnd),
        at(0.seconds(), activity("Increment")).anchored(StartAnchor::DirectiveEnd(id(2))),
    ]);
    let results = run(&plan, 10.seconds())?;

    let start = |n| results.span_for_directive(id(n)).unwrap().1.start_offset;
    assert_eq!(1.seconds(), start(1));
    assert_eq!(6.seconds(), start(2));
    assert_eq!(2.seconds(), start(3));
    assert_eq!(8.seconds(), start(4));
    assert_eq!(6.seconds(), start(5));
    Ok(())
}

#[test]
fn anchor_cycles_fail_before_simulating() {
    let plan = schedule([
        at(1.seconds(), activity("Increment")).anchored(StartAnchor::DirectiveEnd(id(2))),
        at(1.seconds(), activity("Increment")).anchored(StartAnchor::DirectiveStart(id(1))),
    ]);
    let error = run(&plan, 10.seconds()).unwrap_err();
    assert!(matches!(
        error.source,
        EngineError::Anchor {
            source: AnchorError::Cycle { .. }
        }
    ));
}

#[test]
fn chained_anchors_cannot_start_before_an_anchor_end() {
    let plan = schedule([
        at(1.seconds(), activity("Increment")),
        at(1.seconds(), activity("Increment")).anchored(StartAnchor::DirectiveEnd(id(1))),
        at((-3).seconds(), activity("Increment")).anchored(StartAnchor::DirectiveStart(id(2))),
    ]);
    let error = run(&plan, 10.seconds()).unwrap_err();
    assert!(matches!(
        error.source,
        EngineError::Anchor {
            source: AnchorError::NegativeEndOffset { directive, offset }
        } if directive == id(3) && offset == (-2).seconds()
    ));
}

#[test]
fn directives_before_the_simulation_window_are_dropped() -> Result<()> {
    let plan = schedule([
        at(2.seconds(), activity("Increment")),
        at(7.seconds(), activity("Increment").with_argument("amount", 5)),
    ]);
    let simulation_start = plan_start() + 5.seconds();
    let results = simulate(
        &MODEL,
        &plan,
        simulation_start,
        10.seconds(),
        plan_start(),
        15.seconds(),
    )?;

    assert!(results.span_for_directive(id(1)).is_none());
    assert_eq!(2.seconds(), results.span_for_directive(id(2)).unwrap().1.start_offset);
    assert_eq!(Some(&SerializedValue::Int(5)), results.sample_discrete("/count", 10.seconds()));
    Ok(())
}

#[test]
fn unfinished_activities_have_no_duration() -> Result<()> {
    let plan = schedule([at(1.seconds(), activity("Wait").with_argument("duration", 20.seconds()))]);
    let results = run(&plan, 10.seconds())?;

    let (_, span) = results.span_for_directive(id(1)).unwrap();
    assert!(!span.is_finished());
    assert_eq!(None, span.computed_attributes);
    Ok(())
}

#[test]
fn simulation_is_deterministic() -> Result<()> {
    let plan = schedule([
        at(1.seconds(), activity("Increment")),
        at(1.seconds(), activity("Spawner")),
        at(2.seconds(), activity("Parent")),
        at(2.seconds(), activity("Drain")),
        at(1.seconds(), activity("Increment")).anchored(StartAnchor::DirectiveEnd(id(3))),
    ]);
    let first = run(&plan, 10.seconds())?;
    let second = run(&plan, 10.seconds())?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn extending_a_simulation_matches_simulating_everything() -> Result<()> {
    let first = at(1.seconds(), activity("Increment"));
    let second = at(4.seconds(), activity("Drain").with_argument("amount", 3.0));

    let mut resumed = ResumableSimulation::new(MODEL.clone(), plan_start())?;
    resumed.schedule_directives(
        &[(id(1), first.clone())].into(),
        plan_start(),
        10.seconds(),
    )?;
    resumed.run_until(2.seconds())?;
    resumed.schedule_directives(
        &[(id(2), second.clone())].into(),
        plan_start(),
        10.seconds(),
    )?;
    assert!(resumed.run_until_complete(&[id(2)], 10.seconds())?);
    assert_eq!(Some(Duration::ZERO), resumed.directive_duration(id(2)));
    resumed.run_until(10.seconds())?;

    let full = run(&[(id(1), first), (id(2), second)].into(), 10.seconds())?;
    let partial = resumed.results(10.seconds());
    assert_eq!(full.real_profiles, partial.real_profiles);
    assert_eq!(full.discrete_profiles, partial.discrete_profiles);
    Ok(())
}

#[test]
fn extending_into_the_past_is_rejected() -> Result<()> {
    let mut simulation = ResumableSimulation::new(MODEL.clone(), plan_start())?;
    simulation.run_until(5.seconds())?;
    let late = simulation.schedule_directives(
        &[(id(1), at(2.seconds(), activity("Increment")))].into(),
        plan_start(),
        10.seconds(),
    );
    assert!(matches!(
        late.map_err(|e| e.source),
        Err(EngineError::ScheduledInPast { .. })
    ));
    Ok(())
}

#[test]
fn single_tasks_run_until_they_complete() -> Result<()> {
    let factory = MODEL.task_factory(&activity("Wait").with_argument("duration", 3.seconds()))?;
    let results = simulate_task(&MODEL, plan_start(), factory)?;

    assert_eq!(3.seconds(), results.duration);
    assert_eq!(1, results.activities.len());
    assert!(results.activities.values().all(ActivitySpan::is_finished));
    Ok(())
}

#[test]
fn single_tasks_that_never_finish_stall() -> Result<()> {
    let factory = MODEL.task_factory(&activity("WaitForCount").with_argument("target", 100))?;
    let error = simulate_task(&MODEL, plan_start(), factory).unwrap_err();
    assert!(matches!(error.source, EngineError::Stalled { .. }));
    Ok(())
}

#[test]
fn results_survive_storage() -> Result<()> {
    let plan = schedule([
        at(1.seconds(), activity("Parent")),
        at(2.seconds(), activity("SetMode").with_argument("mode", "stored")),
    ]);
    let results = run(&plan, 5.seconds())?;

    let bytes = results.encode()?;
    assert_eq!(results, SimulationResults::decode(&bytes)?);
    Ok(())
}
