mod util;

use banananation::activities::*;
use banananation::{FLAG, FRUIT};
use hifitime::TimeUnits;
use kestrel::SerializedValue;
use kestrel_scheduler::*;
use util::{activity, facade};

#[test]
fn fruit_follows_peeling_and_biting() -> anyhow::Result<()> {
    let mut facade = facade(5.seconds());
    facade.simulate_activity(&activity(PEEL_BANANA, 1.seconds()))?;
    facade.simulate_activity(
        &activity(BITE_BANANA, 2.seconds()).with_argument("biteSize", 0.1),
    )?;

    let results = facade.compute_simulation_results_until(5.seconds())?;
    assert_eq!(Some(4.0), results.sample_real(FRUIT, 0.5.seconds()));
    assert_eq!(Some(3.0), results.sample_real(FRUIT, 1.5.seconds()));
    assert_eq!(Some(2.9), results.sample_real(FRUIT, 2.seconds()));
    Ok(())
}

#[test]
fn removing_an_activity_restores_the_profiles() -> anyhow::Result<()> {
    let peel = activity(PEEL_BANANA, 1.seconds());
    let grow = activity(GROW_BANANA, 3.seconds()).with_argument("growingDuration", 2.seconds());
    let bite = activity(BITE_BANANA, 4.seconds()).with_argument("biteSize", 2.0);

    let mut reference = facade(10.seconds());
    reference.simulate_activities(&[peel.clone(), grow.clone()])?;
    let expected = reference.compute_simulation_results_until(10.seconds())?;

    let mut facade = facade(10.seconds());
    facade.simulate_activities(&[peel.clone(), grow.clone()])?;
    facade.simulate_activity(&bite)?;
    let with_bite = facade.compute_simulation_results_until(10.seconds())?;
    assert_eq!(
        Some(&SerializedValue::from("B")),
        with_bite.sample_discrete(FLAG, 5.seconds())
    );

    facade.remove_activities_from_simulation(&[bite.clone()])?;
    assert!(!facade.is_simulated(bite.id));
    let restored = facade.compute_simulation_results_until(10.seconds())?;
    assert_eq!(expected.real_profiles, restored.real_profiles);
    assert_eq!(expected.discrete_profiles, restored.discrete_profiles);
    assert_eq!(expected.activities.len(), restored.activities.len());
    Ok(())
}

#[test]
fn resimulation_is_deterministic() -> anyhow::Result<()> {
    let plan = [
        activity(PEEL_BANANA, 1.seconds()),
        activity(BITE_BANANA, 1.seconds()),
        activity(CHANGE_PRODUCER, 2.seconds()).with_argument("producer", "Dole"),
        activity(PARENT, 3.seconds()),
    ];

    let mut first = facade(10.seconds());
    first.simulate_activities(&plan)?;
    let mut second = facade(10.seconds());
    second.simulate_activities(&plan)?;

    assert_eq!(
        first.compute_simulation_results_until(10.seconds())?,
        second.compute_simulation_results_until(10.seconds())?
    );
    Ok(())
}

#[test]
fn uncontrollable_durations_are_probed_and_taken_back_out() -> anyhow::Result<()> {
    let mut facade = facade(10.seconds());
    let probe = activity(DURATION_PARAMETER, 2.seconds()).with_argument("duration", 3.seconds());

    assert_eq!(Some(3.seconds()), facade.probe_activity_duration(&probe)?);
    assert!(!facade.is_simulated(probe.id));
    assert_eq!(0, facade.simulated_activities().count());
    Ok(())
}

#[test]
fn children_point_at_their_top_parent() -> anyhow::Result<()> {
    let mut facade = facade(10.seconds());
    let parent = activity(PARENT, 1.seconds());
    facade.simulate_activity(&parent)?;

    assert_eq!(Some(2.seconds()), facade.get_activity_duration(&parent));
    let children = facade.get_all_child_activities(10.seconds())?;
    assert_eq!(2, children.len());
    for (child, top) in &children {
        assert_eq!(parent.id, *top);
        assert_eq!(Some(parent.id), child.top_parent);
        assert_eq!(CHILD, child.type_name);
        assert_eq!(Some(child_duration()), child.duration);
        assert!(!child.is_new);
    }
    let mut starts: Vec<_> = children.iter().map(|(c, _)| c.start_offset).collect();
    starts.sort();
    assert_eq!(vec![1.seconds(), 2.seconds()], starts);
    Ok(())
}

#[test]
fn failed_instantiation_leaves_the_facade_usable() -> anyhow::Result<()> {
    let mut facade = facade(10.seconds());
    let unknown = activity("EatBanana", 1.seconds());

    let error = facade.simulate_activity(&unknown).unwrap_err();
    assert!(matches!(error, SimulationException::Instantiation { .. }));
    assert!(!facade.is_simulated(unknown.id));

    let peel = activity(PEEL_BANANA, 1.seconds());
    facade.simulate_activity(&peel)?;
    assert_eq!(Some(0.seconds()), facade.get_activity_duration(&peel));
    Ok(())
}
