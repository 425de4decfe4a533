//! # Kestrel Scheduler
//!
//! A greedy priority scheduler that places activities by simulating them.
//!
//! A [Problem] bundles a mission model, a planning horizon, an initial plan, and a list
//! of [Goal]s. The [PrioritySolver] works through the goals from highest priority down.
//! Each goal looks at the plan and the latest simulation results and reports what it is
//! missing as [Conflict]s; the solver answers each conflict by associating an activity
//! already in the plan or by creating a new one inside the windows where the goal's
//! constraints hold. Every new activity is simulated before it is accepted, and thrown
//! back out if it doesn't run the way it was expected to.
//!
//! Simulation goes through a [SimulationFacade], which keeps one resumable kestrel
//! simulation alive across insertions and only starts over when it has to.
//!
//! ```
//! # use kestrel_scheduler::*;
//! # use hifitime::TimeUnits;
//! # fn run(model: kestrel::MissionModel, start: kestrel::Time) -> anyhow::Result<()> {
//! let mut problem = Problem::new(model, PlanningHorizon::starting_at(start, 10.seconds()));
//! problem.add_goal(Goal::recurrence(
//!     "peel every two seconds",
//!     RecurrenceGoal::new(ActivityCreationTemplate::of_type("PeelBanana"), 2.seconds()),
//! ));
//! let plan = PrioritySolver::new(problem).next_solution()?;
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod agent;
pub mod config;
pub mod conflicts;
pub mod constraints;
pub mod dsl;
pub mod error;
pub mod facade;
pub mod global;
pub mod goals;
pub mod plan;
pub mod problem;
pub mod solver;
pub mod time;
pub mod windows;

pub use crate::activity::{
    ActivityCreationTemplate, ActivityExpression, ActivityType, SchedulingActivityDirective,
};
pub use crate::agent::{
    GoalResult, LocalSchedulerAgent, OneshotWriter, ResultsWriter, ScheduleRequest,
    ScheduleResults, SchedulerAgent, SchedulingFailure, ThreadedSchedulerAgent,
};
pub use crate::config::{DslCompilerConfig, Placement, SchedulerConfig};
pub use crate::conflicts::Conflict;
pub use crate::constraints::{CompareOp, EvaluationEnvironment, WindowsExpression};
pub use crate::dsl::{CodeLocation, CompilationRequest, DslCompiler, UserCodeError};
pub use crate::error::{
    AgentError, ConfigError, DslError, EvaluationError, SimulationException, SolverError,
};
pub use crate::facade::SimulationFacade;
pub use crate::global::{ActivityMutex, GlobalConstraint};
pub use crate::goals::{
    CardinalityGoal, CoexistenceAnchor, CoexistenceGoal, Goal, GoalId, GoalKind, Optimizer,
    ProceduralGoal, RecurrenceGoal, TimeAnchor,
};
pub use crate::plan::{Evaluation, GoalEvaluation, Plan};
pub use crate::problem::Problem;
pub use crate::solver::PrioritySolver;
pub use crate::time::{Inclusivity, Interval, PlanningHorizon};
pub use crate::windows::Windows;
