use crate::internal::cells::LiveCells;
use crate::internal::engine::{SimulationEngine, TaskId};
use crate::internal::reducer::{
    AnchorForest, StartOffsetReducer, adjust_start_offsets, filter_out_negative_start_offsets,
};
use crate::internal::timeline::TemporalEventSource;
use crate::public::directive::{ActivityDirective, ActivityDirectiveId};
use crate::public::error::{EngineError, SimulationError};
use crate::public::model::MissionModel;
use crate::public::results::SimulationResults;
use crate::public::task::{TaskFactory, TaskStatus};
use hifitime::{Duration, Epoch as Time};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub type Schedule = BTreeMap<ActivityDirectiveId, ActivityDirective>;

/// A simulation that can be paused, extended with more directives, and continued.
///
/// [simulate] is a thin wrapper around this. The scheduler keeps one of these alive
/// between insertions so that it only has to simulate what's new.
pub struct ResumableSimulation {
    model: MissionModel,
    engine: SimulationEngine,
    cells: LiveCells,
    timeline: TemporalEventSource,
    start: Time,
    elapsed: Duration,
    directive_tasks: BTreeMap<ActivityDirectiveId, TaskId>,
}

impl ResumableSimulation {
    /// Starts tracking resources and runs the daemons to their first suspension.
    pub fn new(model: MissionModel, start: Time) -> Result<Self, SimulationError> {
        let cells = model.initial_cells();
        let mut engine = SimulationEngine::new();
        for (name, resource) in model.resources() {
            engine.track_resource(name, resource.clone(), &cells, Duration::ZERO);
        }
        engine.schedule_task(Duration::ZERO, model.daemon());

        let mut simulation = Self {
            model,
            engine,
            cells,
            timeline: TemporalEventSource::new(),
            start,
            elapsed: Duration::ZERO,
            directive_tasks: BTreeMap::new(),
        };
        let batch = simulation.engine.extract_next_jobs(Duration::MAX);
        let commit = simulation
            .engine
            .perform_jobs(batch.jobs, &mut simulation.cells, Duration::ZERO, Duration::MAX)
            .map_err(|e| simulation.fail(e))?;
        simulation.timeline.add_commit(commit);
        Ok(simulation)
    }

    fn fail(&self, source: EngineError) -> SimulationError {
        SimulationError {
            elapsed: self.elapsed,
            start: self.start,
            source,
        }
    }

    /// Adds directives to the run.
    ///
    /// Anchors may only point at directives in the same `schedule`. Directives that
    /// would start before the simulation start are dropped; directives that would
    /// start before the current elapsed time are an error.
    pub fn schedule_directives(
        &mut self,
        schedule: &Schedule,
        plan_start: Time,
        plan_duration: Duration,
    ) -> Result<(), SimulationError> {
        let mut forest = StartOffsetReducer::new(plan_duration, schedule)
            .compute()
            .map_err(|e| self.fail(e.into()))?;
        adjust_start_offsets(&mut forest, self.start - plan_start);
        filter_out_negative_start_offsets(&mut forest);

        for directive in schedule.values() {
            self.model
                .task_factory(&directive.activity)
                .map_err(|e| self.fail(e.into()))?;
        }

        let roots = forest.get(&None).cloned().unwrap_or_default();
        let forest = Arc::new(forest);
        let schedule = Arc::new(schedule.clone());
        for (id, offset) in roots {
            if offset < self.elapsed {
                return Err(self.fail(EngineError::ScheduledInPast {
                    offset,
                    elapsed: self.elapsed,
                }));
            }
            let factory = directive_task(&self.model, &schedule, &forest, id);
            self.engine.schedule_task(offset, factory);
        }
        Ok(())
    }

    /// Runs one batch of jobs, if there is one at or before `horizon`.
    ///
    /// Returns false once nothing more can happen before the horizon. In that case
    /// elapsed time has been moved up to the horizon, unless the horizon is unbounded.
    pub fn step_batch(&mut self, horizon: Duration) -> Result<bool, SimulationError> {
        let batch = self.engine.extract_next_jobs(horizon);
        if batch.jobs.is_empty() && horizon == Duration::MAX {
            return Ok(false);
        }

        let delta = batch.offset - self.elapsed;
        if delta > Duration::ZERO {
            self.timeline.add_delta(delta);
            self.cells.advance(delta);
            self.elapsed = batch.offset;
        }
        if batch.jobs.is_empty() {
            return Ok(false);
        }

        let commit = self
            .engine
            .perform_jobs(batch.jobs, &mut self.cells, self.elapsed, horizon)
            .map_err(|e| self.fail(e))?;
        for event in commit.iter() {
            if let Some(id) = event.extract(self.model.activity_topic()) {
                self.directive_tasks.insert(*id, event.provenance);
            }
        }
        self.timeline.add_commit(commit);
        Ok(true)
    }

    /// Runs every job up to and including `time`, then moves elapsed time to `time`.
    pub fn run_until(&mut self, time: Duration) -> Result<(), SimulationError> {
        if time < self.elapsed {
            return Ok(());
        }
        while self.step_batch(time)? {}
        Ok(())
    }

    /// Runs until every listed directive has finished, or nothing else can happen
    /// before `horizon`. Returns whether they all finished.
    pub fn run_until_complete(
        &mut self,
        directives: &[ActivityDirectiveId],
        horizon: Duration,
    ) -> Result<bool, SimulationError> {
        loop {
            if directives.iter().all(|&id| self.is_directive_complete(id)) {
                return Ok(true);
            }
            if !self.step_batch(horizon)? {
                return Ok(directives.iter().all(|&id| self.is_directive_complete(id)));
            }
        }
    }

    pub fn is_directive_complete(&self, id: ActivityDirectiveId) -> bool {
        self.directive_tasks
            .get(&id)
            .is_some_and(|&task| self.engine.is_task_complete(task))
    }

    /// How long a directive's activity ran, once it has finished.
    pub fn directive_duration(&self, id: ActivityDirectiveId) -> Option<Duration> {
        self.engine.task_duration(*self.directive_tasks.get(&id)?)
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn start(&self) -> Time {
        self.start
    }

    pub fn timeline(&self) -> &TemporalEventSource {
        &self.timeline
    }

    pub fn cells(&self) -> &LiveCells {
        &self.cells
    }

    pub fn model(&self) -> &MissionModel {
        &self.model
    }

    /// Results up to `until`, or up to the elapsed time if that is earlier.
    pub fn results(&self, until: Duration) -> SimulationResults {
        self.engine.compute_results(
            self.start,
            until.min(self.elapsed),
            self.model.activity_topic(),
            &self.timeline,
            self.model.topics(),
        )
    }
}

/// Wraps a directive's activity so that it announces itself when it starts, and
/// starts everything anchored to its end once it finishes.
fn directive_task(
    model: &MissionModel,
    schedule: &Arc<Schedule>,
    forest: &Arc<AnchorForest>,
    id: ActivityDirectiveId,
) -> TaskFactory {
    let model = model.clone();
    let schedule = schedule.clone();
    let forest = forest.clone();
    TaskFactory::new(move |_| {
        let topic = model.activity_topic().clone();
        let activity = model
            .task_factory(&schedule[&id].activity)?
            .prepend(move |scheduler| scheduler.emit(id, &topic));
        Ok(TaskStatus::calling(activity, move |scheduler, _| {
            for &(dependent, offset) in forest.get(&Some(id)).into_iter().flatten() {
                let next = directive_task(&model, &schedule, &forest, dependent);
                scheduler.spawn(TaskFactory::new(move |_| {
                    Ok(TaskStatus::Delayed(offset, next.create()))
                }));
            }
            Ok(TaskStatus::done())
        }))
    })
}

/// Simulates a whole plan from `simulation_start` for `simulation_duration`.
pub fn simulate(
    model: &MissionModel,
    schedule: &Schedule,
    simulation_start: Time,
    simulation_duration: Duration,
    plan_start: Time,
    plan_duration: Duration,
) -> Result<SimulationResults, SimulationError> {
    debug!(
        directives = schedule.len(),
        %simulation_start,
        %simulation_duration,
        "starting simulation"
    );
    let mut simulation = ResumableSimulation::new(model.clone(), simulation_start)?;
    simulation.schedule_directives(schedule, plan_start, plan_duration)?;
    simulation.run_until(simulation_duration)?;
    debug!(
        entries = simulation.timeline.len(),
        "simulation reached its horizon"
    );
    Ok(simulation.results(simulation_duration))
}

/// Runs a single task, plus the daemons, until the task completes.
pub fn simulate_task(
    model: &MissionModel,
    simulation_start: Time,
    factory: TaskFactory,
) -> Result<SimulationResults, SimulationError> {
    let mut simulation = ResumableSimulation::new(model.clone(), simulation_start)?;
    let task = simulation.engine.schedule_task(simulation.elapsed, factory);
    while !simulation.engine.is_task_complete(task) {
        if !simulation.step_batch(Duration::MAX)? {
            return Err(simulation.fail(EngineError::Stalled {
                elapsed: simulation.elapsed,
            }));
        }
    }
    debug!(elapsed = %simulation.elapsed, "task completed");
    Ok(simulation.results(simulation.elapsed))
}
