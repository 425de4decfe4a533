use crate::internal::cells::LiveCells;
use crate::internal::timeline::{Event, EventGraph, TemporalEventSource};
use crate::public::cell::Topic;
use crate::public::directive::{ActivityDirectiveId, SerializedActivity};
use crate::public::error::EngineError;
use crate::public::model::Resource;
use crate::public::results::{
    ActivitySpan, EventRecord, Profile, ProfileSegment, RealDynamics, SimulationResults, SpanId,
    TopicRecord,
};
use crate::public::task::{Condition, Resume, Scheduler, Task, TaskFactory, TaskStatus};
use crate::public::value::SerializedValue;
use derive_more::Display;
use hifitime::{Duration, Epoch as Time};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use slab::Slab;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use tracing::trace;

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[display("task {_0}")]
pub struct TaskId(usize);

impl TaskId {
    pub(crate) fn from_raw(index: usize) -> Self {
        TaskId(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// Every job that is ready at one instant.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    pub offset: Duration,
    pub jobs: Vec<TaskId>,
}

enum TaskState {
    Pending(TaskFactory),
    Ready(Box<dyn Task>),
    Resuming(Box<dyn Resume>, SerializedValue),
    Awaiting(Box<dyn Task>),
    Calling(Box<dyn Resume>),
    Running,
    Completed,
}

struct TaskRecord {
    state: TaskState,
    parent: Option<TaskId>,
    caller: Option<TaskId>,
    span: Option<SerializedActivity>,
    start: Option<Duration>,
    end: Option<Duration>,
    output: Option<SerializedValue>,
}

struct Footprint {
    task: TaskId,
    reads: SmallVec<usize, 4>,
    writes: SmallVec<usize, 4>,
}

enum Changes {
    Real(Vec<(Duration, RealDynamics)>),
    Discrete(Vec<(Duration, SerializedValue)>),
}

struct TrackedResource {
    name: String,
    resource: Resource,
    changes: Changes,
}

enum ProjectedProfile {
    Real(Profile<RealDynamics>),
    Discrete(Profile<SerializedValue>),
}

fn record_change<D>(
    changes: &mut Vec<(Duration, D)>,
    now: Duration,
    sample: D,
    continues: impl Fn(&D, Duration, &D) -> bool,
) {
    if changes.last().is_some_and(|(start, _)| *start == now) {
        changes.pop();
    }
    if let Some((start, last)) = changes.last() {
        if continues(last, now - *start, &sample) {
            return;
        }
    }
    changes.push((now, sample));
}

fn project<D: Clone>(changes: &[(Duration, D)], until: Duration) -> Profile<D> {
    let relevant = changes.partition_point(|(start, _)| *start <= until);
    let changes = &changes[..relevant];
    changes
        .iter()
        .enumerate()
        .map(|(i, (start, dynamics))| {
            let end = changes.get(i + 1).map(|(next, _)| *next).unwrap_or(until);
            ProfileSegment {
                extent: end - *start,
                dynamics: dynamics.clone(),
            }
        })
        .collect()
}

impl TrackedResource {
    fn sample(&mut self, cells: &LiveCells, now: Duration) {
        match (&self.resource, &mut self.changes) {
            (Resource::Real(get), Changes::Real(changes)) => {
                record_change(changes, now, get(cells), |last, elapsed, next| {
                    last.evolved(elapsed) == *next
                })
            }
            (Resource::Discrete(get), Changes::Discrete(changes)) => {
                record_change(changes, now, get(cells), |last, _, next| last == next)
            }
            _ => unreachable!("resource {} changed kind mid-simulation", self.name),
        }
    }

    fn project(&self, until: Duration) -> ProjectedProfile {
        match &self.changes {
            Changes::Real(changes) => ProjectedProfile::Real(project(changes, until)),
            Changes::Discrete(changes) => ProjectedProfile::Discrete(project(changes, until)),
        }
    }
}

/// The task table and job queue of one simulation run.
///
/// The engine never looks at wall-clock order. Every job ready at the same instant is
/// handed out in one [Batch], and their effects are committed together as one
/// concurrent [EventGraph].
#[derive(Default)]
pub struct SimulationEngine {
    tasks: Slab<TaskRecord>,
    queue: BTreeMap<(Duration, u64), TaskId>,
    sequence: u64,
    conditions: Vec<(TaskId, Condition)>,
    resources: Vec<TrackedResource>,
}

impl SimulationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts recording a resource's profile, sampling it now.
    pub fn track_resource(
        &mut self,
        name: &str,
        resource: Resource,
        cells: &LiveCells,
        now: Duration,
    ) {
        let changes = match resource {
            Resource::Real(_) => Changes::Real(vec![]),
            Resource::Discrete(_) => Changes::Discrete(vec![]),
        };
        let mut tracked = TrackedResource {
            name: name.to_string(),
            resource,
            changes,
        };
        tracked.sample(cells, now);
        self.resources.push(tracked);
    }

    /// Registers a new task to begin at `offset`.
    pub fn schedule_task(&mut self, offset: Duration, factory: TaskFactory) -> TaskId {
        let id = self.insert(factory, None, None);
        self.enqueue(offset, id);
        id
    }

    fn insert(
        &mut self,
        factory: TaskFactory,
        parent: Option<TaskId>,
        caller: Option<TaskId>,
    ) -> TaskId {
        let span = factory.span.clone();
        TaskId(self.tasks.insert(TaskRecord {
            state: TaskState::Pending(factory),
            parent,
            caller,
            span,
            start: None,
            end: None,
            output: None,
        }))
    }

    fn enqueue(&mut self, time: Duration, task: TaskId) {
        self.queue.insert((time, self.sequence), task);
        self.sequence += 1;
    }

    /// Takes every job at the earliest queued instant, if it is at or before `horizon`.
    ///
    /// Otherwise returns an empty batch exactly at `horizon`.
    pub fn extract_next_jobs(&mut self, horizon: Duration) -> Batch {
        let next = match self.queue.first_key_value() {
            Some((&(time, _), _)) if time <= horizon => time,
            _ => {
                return Batch {
                    offset: horizon,
                    jobs: vec![],
                };
            }
        };
        let mut jobs = vec![];
        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0 != next {
                break;
            }
            jobs.push(entry.remove());
        }
        Batch { offset: next, jobs }
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Runs every job in the batch to its next suspension point and commits the instant.
    pub fn perform_jobs(
        &mut self,
        jobs: Vec<TaskId>,
        cells: &mut LiveCells,
        now: Duration,
        horizon: Duration,
    ) -> Result<EventGraph<Event>, EngineError> {
        trace!(jobs = jobs.len(), %now, %horizon, "performing batch");
        let mut branches = Vec::with_capacity(jobs.len());
        let mut footprints = Vec::with_capacity(jobs.len());
        for job in jobs {
            let (events, reads) = self.step_task(job, cells, now)?;
            let mut writes = SmallVec::<usize, 4>::new();
            for event in &events {
                for &cell in cells.listeners(event.topic) {
                    if !writes.contains(&cell) {
                        writes.push(cell);
                    }
                }
            }
            footprints.push(Footprint {
                task: job,
                reads,
                writes,
            });
            branches.push(EventGraph::sequence(events));
        }

        check_conflicts(&footprints, cells, now)?;

        let commit = EventGraph::concurrent(branches);
        cells.apply(&commit);
        self.poll_conditions(cells, now);
        for resource in &mut self.resources {
            resource.sample(cells, now);
        }
        Ok(commit)
    }

    fn step_task(
        &mut self,
        job: TaskId,
        cells: &LiveCells,
        now: Duration,
    ) -> Result<(Vec<Event>, SmallVec<usize, 4>), EngineError> {
        let record = &mut self.tasks[job.0];
        record.start.get_or_insert(now);
        let state = std::mem::replace(&mut record.state, TaskState::Running);

        let mut scheduler = Scheduler::new(cells, job, now);
        let status = match state {
            TaskState::Pending(factory) => factory.create().step(&mut scheduler),
            TaskState::Ready(task) => task.step(&mut scheduler),
            TaskState::Resuming(continuation, output) => {
                continuation.resume(&mut scheduler, output)
            }
            _ => unreachable!("{job} was scheduled while it was not ready to run"),
        }
        .map_err(|cause| EngineError::TaskFailed {
            task: job,
            time: now,
            cause,
        })?;
        let (events, spawned, reads) = scheduler.into_parts();

        for factory in spawned {
            let child = self.insert(factory, Some(job), None);
            self.enqueue(now, child);
        }
        self.handle_status(job, status, now)?;
        Ok((events, reads))
    }

    fn handle_status(
        &mut self,
        job: TaskId,
        status: TaskStatus,
        now: Duration,
    ) -> Result<(), EngineError> {
        match status {
            TaskStatus::Completed(output) => {
                let record = &mut self.tasks[job.0];
                record.state = TaskState::Completed;
                record.end = Some(now);
                record.output = Some(output.clone());
                if let Some(caller) = record.caller {
                    let caller_record = &mut self.tasks[caller.0];
                    match std::mem::replace(&mut caller_record.state, TaskState::Running) {
                        TaskState::Calling(continuation) => {
                            caller_record.state = TaskState::Resuming(continuation, output)
                        }
                        _ => unreachable!("{caller} called {job} but is not waiting for it"),
                    }
                    self.enqueue(now, caller);
                }
            }
            TaskStatus::Delayed(delay, continuation) => {
                if delay < Duration::ZERO {
                    return Err(EngineError::NegativeDelay {
                        task: job,
                        time: now,
                        delay,
                    });
                }
                self.tasks[job.0].state = TaskState::Ready(continuation);
                self.enqueue(now + delay, job);
            }
            TaskStatus::AwaitingCondition(condition, continuation) => {
                self.tasks[job.0].state = TaskState::Awaiting(continuation);
                self.conditions.push((job, condition));
            }
            TaskStatus::Calling(factory, continuation) => {
                self.tasks[job.0].state = TaskState::Calling(continuation);
                let child = self.insert(factory, Some(job), Some(job));
                self.enqueue(now, child);
            }
        }
        Ok(())
    }

    fn poll_conditions(&mut self, cells: &LiveCells, now: Duration) {
        let mut satisfied = vec![];
        self.conditions.retain(|(task, condition)| {
            if condition(cells) {
                satisfied.push(*task);
                false
            } else {
                true
            }
        });
        for task in satisfied {
            let record = &mut self.tasks[task.0];
            match std::mem::replace(&mut record.state, TaskState::Running) {
                TaskState::Awaiting(continuation) => record.state = TaskState::Ready(continuation),
                _ => unreachable!("{task} had a condition but was not awaiting it"),
            }
            self.enqueue(now, task);
        }
    }

    pub fn is_task_complete(&self, task: TaskId) -> bool {
        self.tasks
            .get(task.0)
            .is_some_and(|r| matches!(r.state, TaskState::Completed))
    }

    /// How long a completed task ran for.
    pub fn task_duration(&self, task: TaskId) -> Option<Duration> {
        let record = self.tasks.get(task.0)?;
        Some(record.end? - record.start?)
    }

    pub fn task_output(&self, task: TaskId) -> Option<&SerializedValue> {
        self.tasks.get(task.0)?.output.as_ref()
    }

    fn span_parent(&self, record: &TaskRecord) -> Option<SpanId> {
        let mut current = record.parent;
        while let Some(parent) = current {
            let parent_record = &self.tasks[parent.0];
            if parent_record.span.is_some() {
                return Some(SpanId(parent.0 as u64));
            }
            current = parent_record.parent;
        }
        None
    }

    /// Projects the run, up to `elapsed`, into profiles, spans, and events.
    ///
    /// Directive ids are recovered from the events that tasks emitted on `activity_topic`.
    pub fn compute_results(
        &self,
        start_time: Time,
        elapsed: Duration,
        activity_topic: &Topic<ActivityDirectiveId>,
        timeline: &TemporalEventSource,
        topics: &[TopicRecord],
    ) -> SimulationResults {
        let mut directives = BTreeMap::new();
        let mut events: BTreeMap<Duration, Vec<EventGraph<EventRecord>>> = BTreeMap::new();
        for (time, commit) in timeline.commits() {
            if time > elapsed {
                break;
            }
            for event in commit.iter() {
                if let Some(id) = event.extract(activity_topic) {
                    directives.insert(event.provenance, *id);
                }
            }
            if !commit.is_empty() {
                events.entry(time).or_default().push(commit.map(&|e: &Event| EventRecord {
                    topic: e.topic,
                    value: e.serialized(),
                }));
            }
        }

        let projected: Vec<(String, ProjectedProfile)> = self
            .resources
            .par_iter()
            .map(|r| (r.name.clone(), r.project(elapsed)))
            .collect();
        let mut real_profiles = BTreeMap::new();
        let mut discrete_profiles = BTreeMap::new();
        for (name, profile) in projected {
            match profile {
                ProjectedProfile::Real(p) => {
                    real_profiles.insert(name, p);
                }
                ProjectedProfile::Discrete(p) => {
                    discrete_profiles.insert(name, p);
                }
            }
        }

        let mut activities = BTreeMap::new();
        for (index, record) in self.tasks.iter() {
            let (Some(activity), Some(start)) = (&record.span, record.start) else {
                continue;
            };
            if start > elapsed {
                continue;
            }
            let duration = record.end.filter(|end| *end <= elapsed).map(|end| end - start);
            activities.insert(
                SpanId(index as u64),
                ActivitySpan {
                    type_name: activity.type_name.clone(),
                    arguments: activity.arguments.clone(),
                    start_offset: start,
                    duration,
                    parent: self.span_parent(record),
                    children: vec![],
                    directive_id: directives.get(&TaskId(index)).copied(),
                    computed_attributes: duration.and(record.output.clone()),
                },
            );
        }
        let links: Vec<(SpanId, SpanId)> = activities
            .iter()
            .filter_map(|(id, span)| span.parent.map(|parent| (parent, *id)))
            .collect();
        for (parent, child) in links {
            if let Some(parent) = activities.get_mut(&parent) {
                parent.children.push(child);
            }
        }

        SimulationResults {
            start_time,
            duration: elapsed,
            real_profiles,
            discrete_profiles,
            activities,
            topics: topics.to_vec(),
            events,
        }
    }
}

fn check_conflicts(
    footprints: &[Footprint],
    cells: &LiveCells,
    now: Duration,
) -> Result<(), EngineError> {
    let mut writers: BTreeMap<usize, SmallVec<TaskId, 2>> = BTreeMap::new();
    for footprint in footprints {
        for &cell in &footprint.writes {
            writers.entry(cell).or_default().push(footprint.task);
        }
    }
    for (&cell, tasks) in &writers {
        if cells.is_commutative(cell) {
            continue;
        }
        if tasks.len() > 1 {
            return Err(EngineError::ConflictingWrites {
                cell: cells.cell_name(cell).to_string(),
                time: now,
                tasks: tasks.to_vec(),
            });
        }
        let writer = tasks[0];
        if let Some(reader) = footprints
            .iter()
            .find(|f| f.task != writer && f.reads.contains(&cell))
        {
            return Err(EngineError::ReadWriteConflict {
                cell: cells.cell_name(cell).to_string(),
                time: now,
                reader: reader.task,
                writer,
            });
        }
    }
    Ok(())
}
