use crate::internal::cells::{ErasedCell, LiveCells};
use crate::internal::engine::TaskId;
use crate::internal::timeline::Event;
use crate::public::cell::{CellId, EventValue, Topic};
use crate::public::directive::SerializedActivity;
use crate::public::value::SerializedValue;
use ahash::AHashMap;
use hifitime::Duration;
use smallvec::SmallVec;

/// A suspended piece of simulated behavior.
///
/// Each step runs until the next suspension point and hands back a [TaskStatus], which owns
/// the continuation to run next. Any closure of the right shape is a task; see [task].
pub trait Task: Send {
    fn step(self: Box<Self>, scheduler: &mut Scheduler<'_>) -> anyhow::Result<TaskStatus>;
}

impl<F> Task for F
where
    F: FnOnce(&mut Scheduler<'_>) -> anyhow::Result<TaskStatus> + Send,
{
    fn step(self: Box<Self>, scheduler: &mut Scheduler<'_>) -> anyhow::Result<TaskStatus> {
        (*self)(scheduler)
    }
}

/// The continuation of a task that called a child, resumed with the child's output.
pub trait Resume: Send {
    fn resume(
        self: Box<Self>,
        scheduler: &mut Scheduler<'_>,
        output: SerializedValue,
    ) -> anyhow::Result<TaskStatus>;
}

impl<F> Resume for F
where
    F: FnOnce(&mut Scheduler<'_>, SerializedValue) -> anyhow::Result<TaskStatus> + Send,
{
    fn resume(
        self: Box<Self>,
        scheduler: &mut Scheduler<'_>,
        output: SerializedValue,
    ) -> anyhow::Result<TaskStatus> {
        (*self)(scheduler, output)
    }
}

/// Boxes a closure as a task. Mostly exists so that closure arguments get inferred.
pub fn task<F>(f: F) -> Box<dyn Task>
where
    F: FnOnce(&mut Scheduler<'_>) -> anyhow::Result<TaskStatus> + Send + 'static,
{
    Box::new(f)
}

/// A predicate over the current cell state, polled at the end of every batch.
pub type Condition = Box<dyn Fn(&LiveCells) -> bool + Send>;

pub enum TaskStatus {
    Completed(SerializedValue),
    Delayed(Duration, Box<dyn Task>),
    AwaitingCondition(Condition, Box<dyn Task>),
    Calling(TaskFactory, Box<dyn Resume>),
}

impl TaskStatus {
    pub fn completed(output: impl Into<SerializedValue>) -> Self {
        TaskStatus::Completed(output.into())
    }

    pub fn done() -> Self {
        TaskStatus::Completed(SerializedValue::Null)
    }

    pub fn delayed<F>(duration: Duration, continuation: F) -> Self
    where
        F: FnOnce(&mut Scheduler<'_>) -> anyhow::Result<TaskStatus> + Send + 'static,
    {
        TaskStatus::Delayed(duration, Box::new(continuation))
    }

    pub fn awaiting<C, F>(condition: C, continuation: F) -> Self
    where
        C: Fn(&LiveCells) -> bool + Send + 'static,
        F: FnOnce(&mut Scheduler<'_>) -> anyhow::Result<TaskStatus> + Send + 'static,
    {
        TaskStatus::AwaitingCondition(Box::new(condition), Box::new(continuation))
    }

    pub fn calling<F>(child: TaskFactory, continuation: F) -> Self
    where
        F: FnOnce(&mut Scheduler<'_>, SerializedValue) -> anyhow::Result<TaskStatus>
            + Send
            + 'static,
    {
        TaskStatus::Calling(child, Box::new(continuation))
    }
}

/// Creates a task when the engine is ready to start it.
///
/// Factories built with [TaskFactory::activity] are reported as activity spans in the
/// results. Plain factories (daemons, bookkeeping) are not.
pub struct TaskFactory {
    pub(crate) span: Option<SerializedActivity>,
    create: Box<dyn FnOnce() -> Box<dyn Task> + Send>,
}

impl TaskFactory {
    pub fn new<F>(first_step: F) -> Self
    where
        F: FnOnce(&mut Scheduler<'_>) -> anyhow::Result<TaskStatus> + Send + 'static,
    {
        Self {
            span: None,
            create: Box::new(move || task(first_step)),
        }
    }

    pub fn activity<F>(activity: SerializedActivity, first_step: F) -> Self
    where
        F: FnOnce(&mut Scheduler<'_>) -> anyhow::Result<TaskStatus> + Send + 'static,
    {
        Self {
            span: Some(activity),
            create: Box::new(move || task(first_step)),
        }
    }

    /// Marks the tasks from this factory as instances of `activity`.
    pub fn with_span(mut self, activity: SerializedActivity) -> Self {
        self.span = Some(activity);
        self
    }

    pub fn span(&self) -> Option<&SerializedActivity> {
        self.span.as_ref()
    }

    /// Runs `prelude` at the very start of the task, in the same step as its first step.
    pub fn prepend<F>(self, prelude: F) -> Self
    where
        F: FnOnce(&mut Scheduler<'_>) + Send + 'static,
    {
        let TaskFactory { span, create } = self;
        Self {
            span,
            create: Box::new(move || {
                task(move |scheduler| {
                    prelude(scheduler);
                    create().step(scheduler)
                })
            }),
        }
    }

    pub fn create(self) -> Box<dyn Task> {
        (self.create)()
    }
}

/// A task's view of the simulation during one step.
///
/// Reads see the committed state of the previous instant plus this task's own writes.
/// Writes become visible to other tasks once the instant commits.
pub struct Scheduler<'a> {
    cells: &'a LiveCells,
    task: TaskId,
    now: Duration,
    overlay: AHashMap<usize, Box<dyn ErasedCell>>,
    events: Vec<Event>,
    spawned: Vec<TaskFactory>,
    reads: SmallVec<usize, 4>,
}

impl<'a> Scheduler<'a> {
    pub(crate) fn new(cells: &'a LiveCells, task: TaskId, now: Duration) -> Self {
        Self {
            cells,
            task,
            now,
            overlay: AHashMap::new(),
            events: vec![],
            spawned: vec![],
            reads: SmallVec::new(),
        }
    }

    pub(crate) fn into_parts(self) -> (Vec<Event>, Vec<TaskFactory>, SmallVec<usize, 4>) {
        (self.events, self.spawned, self.reads)
    }

    pub fn get<S: Clone + 'static>(&mut self, cell: CellId<S>) -> S {
        if !self.reads.contains(&cell.index) {
            self.reads.push(cell.index);
        }
        match self.overlay.get(&cell.index) {
            Some(local) => local
                .state()
                .downcast_ref::<S>()
                .unwrap_or_else(|| panic!("{cell:?} does not hold the requested type"))
                .clone(),
            None => self.cells.get(cell).clone(),
        }
    }

    pub fn emit<E: EventValue>(&mut self, event: E, topic: &Topic<E>) {
        let cells = self.cells;
        for &index in cells.listeners(topic.id()) {
            self.overlay
                .entry(index)
                .or_insert_with(|| cells.duplicate_cell(index))
                .apply(&event);
        }
        self.events.push(Event::new(topic, self.task, event));
    }

    /// Starts a new task in the current instant. It runs after this batch commits.
    pub fn spawn(&mut self, factory: TaskFactory) {
        self.spawned.push(factory);
    }

    /// Time since the start of the simulation.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn task_id(&self) -> TaskId {
        self.task
    }
}
