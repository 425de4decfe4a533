use crate::activity::SchedulingActivityDirective;
use crate::error::SimulationException;
use crate::time::PlanningHorizon;
use hifitime::Duration;
use kestrel::{
    ActivityDirectiveId, MissionModel, ResumableSimulation, Schedule, SimulationResults,
};
use std::collections::BTreeMap;
use std::slice;
use std::sync::Arc;
use tracing::{debug, trace};

/// Keeps a simulation of the scheduler's working plan up to date as activities come and go.
///
/// Adding activities that all start after the current simulated time just extends the
/// running simulation. Anything else, including every removal, throws the run away and
/// simulates the remaining activities from scratch; the timeline can only be appended to.
pub struct SimulationFacade {
    model: MissionModel,
    horizon: PlanningHorizon,
    simulation: Option<ResumableSimulation>,
    /// Simulated activities by id, with the directive id they were simulated under.
    simulated: BTreeMap<ActivityDirectiveId, (ActivityDirectiveId, SchedulingActivityDirective)>,
    latest: Option<Arc<SimulationResults>>,
}

impl SimulationFacade {
    pub fn new(model: MissionModel, horizon: PlanningHorizon) -> Self {
        Self {
            model,
            horizon,
            simulation: None,
            simulated: BTreeMap::new(),
            latest: None,
        }
    }

    pub fn horizon(&self) -> &PlanningHorizon {
        &self.horizon
    }

    pub fn model(&self) -> &MissionModel {
        &self.model
    }

    pub fn is_simulated(&self, id: ActivityDirectiveId) -> bool {
        self.simulated.contains_key(&id)
    }

    pub fn simulated_activities(&self) -> impl Iterator<Item = &SchedulingActivityDirective> {
        self.simulated.values().map(|(_, activity)| activity)
    }

    pub fn simulate_activity(
        &mut self,
        activity: &SchedulingActivityDirective,
    ) -> Result<(), SimulationException> {
        self.simulate_activities(slice::from_ref(activity))
    }

    /// Adds activities to the simulation and runs until they have all finished, or the
    /// horizon is reached. Activities that are already simulated are skipped.
    pub fn simulate_activities(
        &mut self,
        activities: &[SchedulingActivityDirective],
    ) -> Result<(), SimulationException> {
        let new: Vec<&SchedulingActivityDirective> = activities
            .iter()
            .filter(|a| !self.simulated.contains_key(&a.id))
            .collect();
        if new.is_empty() {
            return Ok(());
        }
        for activity in &new {
            self.model.task_factory(&activity.serialized())?;
        }

        let extend = self.simulation.as_ref().is_some_and(|simulation| {
            new.iter()
                .all(|a| a.anchor.is_none() && a.start_offset > simulation.elapsed())
        });
        self.latest = None;
        for activity in &new {
            self.simulated
                .insert(activity.id, (activity.id, (*activity).clone()));
        }

        let outcome = if extend {
            trace!(count = new.len(), "extending simulation");
            self.extend(&new)
        } else {
            self.rebuild()
        };
        if outcome.is_err() {
            for activity in &new {
                self.simulated.remove(&activity.id);
            }
            self.simulation = None;
        }
        outcome
    }

    fn extend(&mut self, new: &[&SchedulingActivityDirective]) -> Result<(), SimulationException> {
        let schedule: Schedule = new.iter().map(|a| (a.id, a.directive())).collect();
        let ids: Vec<ActivityDirectiveId> = schedule.keys().copied().collect();
        let horizon = self.horizon;
        let simulation = self.simulation()?;
        simulation.schedule_directives(&schedule, horizon.start, horizon.duration())?;
        simulation.run_until_complete(&ids, horizon.end_offset())?;
        Ok(())
    }

    /// Simulates every remaining activity from scratch.
    fn rebuild(&mut self) -> Result<(), SimulationException> {
        self.latest = None;
        self.simulation = None;
        let simulation = self.build()?;
        self.simulation = Some(simulation);
        Ok(())
    }

    fn build(&mut self) -> Result<ResumableSimulation, SimulationException> {
        debug!(activities = self.simulated.len(), "resimulating from scratch");
        let mut simulation = ResumableSimulation::new(self.model.clone(), self.horizon.start)?;
        let mut schedule = Schedule::new();
        for (id, (directive, activity)) in self.simulated.iter_mut() {
            *directive = *id;
            schedule.insert(*id, activity.directive());
        }
        let ids: Vec<ActivityDirectiveId> = schedule.keys().copied().collect();
        simulation.schedule_directives(&schedule, self.horizon.start, self.horizon.duration())?;
        simulation.run_until_complete(&ids, self.horizon.end_offset())?;
        Ok(simulation)
    }

    fn simulation(&mut self) -> Result<&mut ResumableSimulation, SimulationException> {
        let simulation = match self.simulation.take() {
            Some(simulation) => simulation,
            None => self.build()?,
        };
        Ok(self.simulation.insert(simulation))
    }

    /// Takes activities back out, as if they had never been simulated.
    pub fn remove_activities_from_simulation(
        &mut self,
        activities: &[SchedulingActivityDirective],
    ) -> Result<(), SimulationException> {
        let removed = activities
            .iter()
            .filter(|a| self.simulated.remove(&a.id).is_some())
            .count();
        if removed > 0 {
            self.rebuild()?;
        }
        Ok(())
    }

    /// Points the bookkeeping for `old` at `new`, without touching the simulation.
    pub fn replace_activity_from_simulation(
        &mut self,
        old: &SchedulingActivityDirective,
        new: &SchedulingActivityDirective,
    ) -> Result<(), SimulationException> {
        let (directive, _) = self
            .simulated
            .remove(&old.id)
            .ok_or(SimulationException::UnknownActivity { id: old.id })?;
        self.simulated.insert(new.id, (directive, new.clone()));
        Ok(())
    }

    /// How long the activity ran in simulation, if it has finished.
    pub fn get_activity_duration(&self, activity: &SchedulingActivityDirective) -> Option<Duration> {
        let (directive, _) = self.simulated.get(&activity.id)?;
        self.simulation.as_ref()?.directive_duration(*directive)
    }

    /// Activities spawned by simulated activities before `until`, each paired with the
    /// id of the simulated activity at the top of its chain.
    pub fn get_all_child_activities(
        &mut self,
        until: Duration,
    ) -> Result<Vec<(SchedulingActivityDirective, ActivityDirectiveId)>, SimulationException> {
        let results = self.compute_simulation_results_until(until)?;
        let by_directive: BTreeMap<ActivityDirectiveId, ActivityDirectiveId> = self
            .simulated
            .iter()
            .map(|(id, (directive, _))| (*directive, *id))
            .collect();

        let mut children = vec![];
        for (span_id, span) in &results.activities {
            if span.directive_id.is_some() || span.parent.is_none() || span.start_offset > until {
                continue;
            }
            let Some(parent) = results
                .activities
                .get(&results.root_of(*span_id))
                .and_then(|root| root.directive_id)
                .and_then(|directive| by_directive.get(&directive))
            else {
                continue;
            };
            let mut child = SchedulingActivityDirective::new(
                &span.type_name,
                span.start_offset,
                span.arguments.clone(),
            )
            .existing();
            child.duration = span.duration;
            child.top_parent = Some(*parent);
            children.push((child, *parent));
        }
        Ok(children)
    }

    /// Results covering at least `time`. Reuses the last results if nothing changed since.
    pub fn compute_simulation_results_until(
        &mut self,
        time: Duration,
    ) -> Result<Arc<SimulationResults>, SimulationException> {
        if let Some(latest) = &self.latest {
            if latest.duration >= time {
                return Ok(latest.clone());
            }
        }
        let simulation = self.simulation()?;
        simulation.run_until(time)?;
        let results = Arc::new(simulation.results(simulation.elapsed()));
        self.latest = Some(results.clone());
        Ok(results)
    }

    pub fn latest_constraint_simulation_results(&self) -> Option<Arc<SimulationResults>> {
        self.latest.clone()
    }

    pub fn current_simulation_end_time(&self) -> Duration {
        self.simulation
            .as_ref()
            .map_or(Duration::ZERO, ResumableSimulation::elapsed)
    }

    /// Simulates `activity` just long enough to see how long it runs, then removes it.
    pub fn probe_activity_duration(
        &mut self,
        activity: &SchedulingActivityDirective,
    ) -> Result<Option<Duration>, SimulationException> {
        let already_simulated = self.is_simulated(activity.id);
        self.simulate_activity(activity)?;
        let duration = self.get_activity_duration(activity);
        if !already_simulated {
            self.remove_activities_from_simulation(slice::from_ref(activity))?;
        }
        trace!(type_name = %activity.type_name, ?duration, "probed duration");
        Ok(duration)
    }
}
