use crate::internal::engine::TaskId;
use crate::public::directive::ActivityDirectiveId;
use derive_more::{Display, Error};
use hifitime::{Duration, Epoch as Time};

/// The mission model could not turn a serialized activity into a task.
#[derive(Clone, Debug, PartialEq, Display, Error)]
pub enum InstantiationError {
    #[display("no activity type named {type_name:?}")]
    UnknownType { type_name: String },
    #[display("activity {type_name:?} is missing argument {argument:?}")]
    MissingArgument { type_name: String, argument: String },
    #[display("activity {type_name:?} has an invalid argument {argument:?}: {reason}")]
    InvalidArgument {
        type_name: String,
        argument: String,
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Display, Error)]
pub enum AnchorError {
    #[display("{directive} is anchored to {anchor}, which is not in the schedule")]
    UnknownAnchor {
        directive: ActivityDirectiveId,
        anchor: ActivityDirectiveId,
    },
    #[display("{directive} is part of an anchor cycle")]
    Cycle { directive: ActivityDirectiveId },
    #[display("{directive} starts {offset} after the end of its anchor, which is negative")]
    NegativeEndOffset {
        directive: ActivityDirectiveId,
        offset: Duration,
    },
}

#[derive(Debug, Display, Error)]
pub enum EngineError {
    #[display("tasks {tasks:?} wrote to cell {cell:?} in the same instant at {time}")]
    ConflictingWrites {
        cell: String,
        time: Duration,
        tasks: Vec<TaskId>,
    },
    #[display("{reader} read cell {cell:?} at {time} while {writer} wrote to it in the same instant")]
    ReadWriteConflict {
        cell: String,
        time: Duration,
        reader: TaskId,
        writer: TaskId,
    },
    #[display("{task} asked for a negative delay ({delay}) at {time}")]
    NegativeDelay {
        task: TaskId,
        time: Duration,
        delay: Duration,
    },
    #[display("{task} failed at {time}: {cause}")]
    TaskFailed {
        task: TaskId,
        time: Duration,
        cause: anyhow::Error,
    },
    #[display("cannot start a task at {offset}, the simulation is already at {elapsed}")]
    ScheduledInPast { offset: Duration, elapsed: Duration },
    #[display("the simulation ran out of work at {elapsed} before the task completed")]
    Stalled { elapsed: Duration },
    #[display("{source}")]
    Instantiation { source: InstantiationError },
    #[display("{source}")]
    Anchor { source: AnchorError },
}

impl From<InstantiationError> for EngineError {
    fn from(source: InstantiationError) -> Self {
        EngineError::Instantiation { source }
    }
}

impl From<AnchorError> for EngineError {
    fn from(source: AnchorError) -> Self {
        EngineError::Anchor { source }
    }
}

/// A simulation run failed. Carries where in the run it happened.
#[derive(Debug, Display, Error)]
#[display("simulation failed {elapsed} into the run starting at {start}: {source}")]
pub struct SimulationError {
    pub elapsed: Duration,
    pub start: Time,
    pub source: EngineError,
}

#[derive(Debug, Display, Error)]
pub enum PersistenceError {
    #[display("no profile segments found")]
    NoSegments,
    #[display("could not encode simulation results: {source}")]
    Encode { source: bincode::error::EncodeError },
    #[display("could not decode simulation results: {source}")]
    Decode { source: bincode::error::DecodeError },
}

impl From<bincode::error::EncodeError> for PersistenceError {
    fn from(source: bincode::error::EncodeError) -> Self {
        PersistenceError::Encode { source }
    }
}

impl From<bincode::error::DecodeError> for PersistenceError {
    fn from(source: bincode::error::DecodeError) -> Self {
        PersistenceError::Decode { source }
    }
}
