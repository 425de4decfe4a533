use crate::goals::GoalId;
use derive_more::{Display, Error};
use kestrel::{ActivityDirectiveId, InstantiationError, SimulationError};

/// A constraint referred to something the results or the environment don't have.
#[derive(Clone, Debug, PartialEq, Display, Error)]
pub enum EvaluationError {
    #[display("no resource named {name:?} in the simulation results")]
    UnknownResource { name: String },
    #[display("nothing is bound to {alias:?}")]
    UnboundAlias { alias: String },
}

#[derive(Debug, Display, Error)]
pub enum SimulationException {
    #[display("{source}")]
    Instantiation { source: InstantiationError },
    #[display("{source}")]
    Simulation { source: SimulationError },
    #[display("activity {id} was never simulated")]
    UnknownActivity { id: ActivityDirectiveId },
}

impl From<InstantiationError> for SimulationException {
    fn from(source: InstantiationError) -> Self {
        SimulationException::Instantiation { source }
    }
}

impl From<SimulationError> for SimulationException {
    fn from(source: SimulationError) -> Self {
        SimulationException::Simulation { source }
    }
}

#[derive(Debug, Display, Error)]
pub enum SolverError {
    #[display("{source}")]
    Simulation { source: SimulationException },
    #[display("{source}")]
    Evaluation { source: EvaluationError },
    #[display("goal {goal} left the plan in an illegal state: {message}")]
    IllegalState {
        goal: GoalId,
        message: String,
    },
}

impl From<SimulationException> for SolverError {
    fn from(source: SimulationException) -> Self {
        SolverError::Simulation { source }
    }
}

impl From<EvaluationError> for SolverError {
    fn from(source: EvaluationError) -> Self {
        SolverError::Evaluation { source }
    }
}

/// The DSL compiler subprocess misbehaved.
#[derive(Debug, Display, Error)]
pub enum DslError {
    #[display("could not talk to the DSL compiler: {source}")]
    Io { source: std::io::Error },
    #[display("malformed DSL compiler message: {source}")]
    Json { source: serde_json::Error },
    #[display("DSL compiler answered the handshake with {reply:?}")]
    Handshake { reply: String },
    #[display("DSL compiler panicked: {message}")]
    Panic { message: String },
    #[display("DSL compiler sent unknown status {status:?}")]
    UnexpectedStatus { status: String },
    #[display("DSL compiler closed its output")]
    Closed,
}

impl From<std::io::Error> for DslError {
    fn from(source: std::io::Error) -> Self {
        DslError::Io { source }
    }
}

impl From<serde_json::Error> for DslError {
    fn from(source: serde_json::Error) -> Self {
        DslError::Json { source }
    }
}

#[derive(Debug, Display, Error)]
pub enum AgentError {
    #[display("could not start the scheduler worker: {source}")]
    Spawn { source: std::io::Error },
    #[display("the scheduler worker has terminated")]
    Terminated,
    #[display("the scheduler worker panicked")]
    WorkerPanicked,
}

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("could not read config file: {source}")]
    Io { source: std::io::Error },
    #[display("invalid config: {source}")]
    Parse { source: serde_json::Error },
}

impl From<std::io::Error> for ConfigError {
    fn from(source: std::io::Error) -> Self {
        ConfigError::Io { source }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(source: serde_json::Error) -> Self {
        ConfigError::Parse { source }
    }
}
