//! # Kestrel Engine
//!
//! A discrete event spacecraft simulation engine, built to be driven by a scheduler.
//!
//! Kestrel simulates a mission model against a plan of activity directives and reports
//! how the model's resources evolved, which activities ran and when, and every event that
//! happened along the way. The same plan and model always produce the same results, down
//! to the order of concurrent events, which is what lets a scheduler insert an activity,
//! simulate, look at the results, and confidently take the activity back out again.
//!
//! ## Concepts
//!
//! ### Cells & Topics
//!
//! All simulation state lives in cells. A cell has a [CellType] that says how events change
//! its state and how the state evolves when time passes untouched. Cells listen to exactly
//! one [Topic]; tasks never write to cells directly, they emit events on topics and every
//! cell listening to that topic picks them up.
//!
//! The engine commits one instant at a time. Every task that is ready at an instant runs
//! against the state as of the previous commit (plus its own writes), and their events are
//! combined into a single concurrent [EventGraph]. If two tasks write to the same cell in
//! one instant, or one reads a cell another writes, the results would depend on an
//! arbitrary order, so the engine refuses to commit and reports a conflict. Cell types that
//! don't care about order, like the builtin [Accumulator] and [Counter], can opt out of
//! that check by declaring themselves commutative.
//!
//! ### Tasks
//!
//! Tasks are continuations. Each step runs until the task has something to wait for, and
//! returns a [TaskStatus] that owns whatever runs next:
//!
//! - `Completed` ends the task with an output value;
//! - `Delayed` resumes after some amount of simulated time;
//! - `AwaitingCondition` resumes in the first instant where a predicate on the cells holds.
//!   Conditions are checked once per commit;
//! - `Calling` runs a child task and resumes with its output once it completes.
//!
//! Tasks can also spawn children that run independently. Spawned and called children both
//! start in the same instant as their parent, right after it commits.
//!
//! ### Activities & Directives
//!
//! A mission model registers activity types, each a function from arguments to a
//! [TaskFactory]. A plan is a set of [ActivityDirective]s: an activity, a start offset, and
//! what the offset is measured from. Offsets can be relative to the plan start, the plan end,
//! or the start or end of another directive. Start anchors get resolved ahead of time. End
//! anchors can't, so the anchored directive is started from the continuation of the one it
//! is waiting for.
//!
//! ### Results
//!
//! Resources are named functions of the cells, sampled at the end of every commit and
//! recorded as piecewise profiles. Real resources are piecewise linear, discrete ones are
//! piecewise constant. Every task built from an activity is reported as an [ActivitySpan],
//! linked to the span that called or spawned it, and to the directive it came from.
//!
//! ## Incremental simulation
//!
//! [simulate] runs a plan from scratch. A scheduler usually wants to add a few directives
//! and keep going, so [ResumableSimulation] can be extended with more directives as long as
//! they start after the point it has already simulated to. Anything else requires starting
//! over; there is no rewinding.
//!
//! ## Example
//!
//! ```ignore
//! use kestrel::*;
//! use hifitime::TimeUnits;
//!
//! let mut builder = MissionModel::builder();
//! let topic = builder.topic::<f64>("/battery");
//! let battery = builder.allocate("/battery", Accumulator, RealDynamics::constant(100.0), &topic);
//! builder.resource("/battery", Resource::real(move |cells| *cells.get(battery)));
//! builder.activity_type("Drain", DurationType::Fixed(10.seconds()), move |_| {
//!     let topic = topic.clone();
//!     Ok(TaskFactory::new(move |s| {
//!         s.emit(-1.0, &topic);
//!         Ok(TaskStatus::delayed(10.seconds(), |_| Ok(TaskStatus::done())))
//!     }))
//! });
//! let model = builder.build();
//! ```

pub mod internal;
pub mod public;

pub use crate::internal::cells::LiveCells;
pub use crate::internal::engine::{Batch, SimulationEngine, TaskId};
pub use crate::internal::timeline::{
    Event, EventGraph, TemporalEventSource, TimelineEntry, duration_to_epoch, epoch_to_duration,
};
pub use crate::public::cell::{
    Accumulator, CellId, CellType, Counter, EventValue, Register, Topic, TopicId,
};
pub use crate::public::directive::{
    ActivityDirective, ActivityDirectiveId, Arguments, SerializedActivity, StartAnchor,
};
pub use crate::public::driver::{ResumableSimulation, Schedule, simulate, simulate_task};
pub use crate::public::error::{
    AnchorError, EngineError, InstantiationError, PersistenceError, SimulationError,
};
pub use crate::public::model::{
    DurationType, MissionModel, MissionModelBuilder, Parameters, Resource,
};
pub use crate::public::results::{
    ActivitySpan, EventRecord, Profile, ProfileSegment, RealDynamics, SimulationResults, SpanId,
    StoredSegment, TopicRecord, profile_at, profile_from_stored, stored_segments,
};
pub use crate::public::task::{
    Condition, Resume, Scheduler, Task, TaskFactory, TaskStatus, task,
};
pub use crate::public::value::SerializedValue;
pub use anyhow::{Context, Error, Result, anyhow, bail};
pub use hifitime::{Duration, Epoch as Time};
