//! What the scheduler is asked to achieve.
//!
//! A [Goal] wraps one [GoalKind] with the settings every goal shares. Simple goal
//! kinds look at the plan and the latest simulation results and report [Conflict]s.
//! Composite kinds ([GoalKind::And], [GoalKind::Or]) report nothing themselves; the
//! solver satisfies their subgoals instead.

mod cardinality;
mod coexistence;
mod procedural;
mod recurrence;

pub use cardinality::CardinalityGoal;
pub use coexistence::{CoexistenceAnchor, CoexistenceGoal, TimeAnchor};
pub use procedural::ProceduralGoal;
pub use recurrence::RecurrenceGoal;

use crate::activity::SchedulingActivityDirective;
use crate::conflicts::Conflict;
use crate::constraints::{EvaluationEnvironment, WindowsExpression};
use crate::error::EvaluationError;
use crate::plan::Plan;
use crate::time::PlanningHorizon;
use crate::windows::Windows;
use derive_more::Display;
use hifitime::Duration;
use kestrel::SimulationResults;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GOAL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[display("goal {_0}")]
pub struct GoalId(pub u64);

/// How an OR goal picks between subgoals that can all be satisfied.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Optimizer {
    EarliestStart,
    LatestStart,
    EarliestEnd,
    LatestEnd,
}

impl Optimizer {
    fn key(&self, activities: &[SchedulingActivityDirective]) -> Option<Duration> {
        let starts = activities.iter().map(|a| a.start_offset);
        let ends = activities
            .iter()
            .map(|a| a.end_offset().unwrap_or(a.start_offset));
        match self {
            Optimizer::EarliestStart => starts.min(),
            Optimizer::LatestStart => starts.max(),
            Optimizer::EarliestEnd => ends.min(),
            Optimizer::LatestEnd => ends.max(),
        }
    }

    /// Whether `candidate` beats `current`. Anything beats nothing.
    pub fn is_better(
        &self,
        candidate: &[SchedulingActivityDirective],
        current: &[SchedulingActivityDirective],
    ) -> bool {
        match (self.key(candidate), self.key(current)) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(candidate), Some(current)) => match self {
                Optimizer::EarliestStart | Optimizer::EarliestEnd => candidate < current,
                Optimizer::LatestStart | Optimizer::LatestEnd => candidate > current,
            },
        }
    }
}

#[derive(Clone, Debug)]
pub enum GoalKind {
    Recurrence(RecurrenceGoal),
    Coexistence(CoexistenceGoal),
    Cardinality(CardinalityGoal),
    Procedural(ProceduralGoal),
    /// The inner goal, only where `condition` holds.
    Conditional {
        condition: WindowsExpression,
        goal: Box<Goal>,
    },
    And(Vec<Goal>),
    Or {
        subgoals: Vec<Goal>,
        optimizer: Option<Optimizer>,
    },
}

#[derive(Clone, Debug)]
pub struct Goal {
    pub id: GoalId,
    pub name: String,
    /// Higher goes first.
    pub priority: i32,
    pub kind: GoalKind,
    /// Where the goal applies.
    pub temporal_context: WindowsExpression,
    /// Where activities created for the goal may be.
    pub resource_constraints: Option<WindowsExpression>,
    pub should_rollback_if_unsatisfied: bool,
    /// Whether to check insertions in simulation, and resimulate before the next goal.
    pub simulate_after: bool,
}

impl Goal {
    pub fn new(name: impl Into<String>, kind: GoalKind) -> Self {
        Self {
            id: GoalId(NEXT_GOAL_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            priority: 0,
            kind,
            temporal_context: WindowsExpression::Value(true),
            resource_constraints: None,
            should_rollback_if_unsatisfied: false,
            simulate_after: true,
        }
    }

    pub fn recurrence(name: impl Into<String>, goal: RecurrenceGoal) -> Self {
        Self::new(name, GoalKind::Recurrence(goal))
    }

    pub fn coexistence(name: impl Into<String>, goal: CoexistenceGoal) -> Self {
        Self::new(name, GoalKind::Coexistence(goal))
    }

    pub fn cardinality(name: impl Into<String>, goal: CardinalityGoal) -> Self {
        Self::new(name, GoalKind::Cardinality(goal))
    }

    pub fn procedural(name: impl Into<String>, goal: ProceduralGoal) -> Self {
        Self::new(name, GoalKind::Procedural(goal))
    }

    pub fn conditional(name: impl Into<String>, condition: WindowsExpression, goal: Goal) -> Self {
        Self::new(
            name,
            GoalKind::Conditional {
                condition,
                goal: Box::new(goal),
            },
        )
    }

    pub fn and(name: impl Into<String>, subgoals: Vec<Goal>) -> Self {
        Self::new(name, GoalKind::And(subgoals))
    }

    pub fn or(name: impl Into<String>, subgoals: Vec<Goal>, optimizer: Option<Optimizer>) -> Self {
        Self::new(name, GoalKind::Or { subgoals, optimizer })
    }

    pub fn with_id(mut self, id: GoalId) -> Self {
        self.id = id;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn during(mut self, temporal_context: WindowsExpression) -> Self {
        self.temporal_context = temporal_context;
        self
    }

    pub fn constrained_by(mut self, constraint: WindowsExpression) -> Self {
        self.resource_constraints = Some(constraint);
        self
    }

    pub fn rollback_if_unsatisfied(mut self) -> Self {
        self.should_rollback_if_unsatisfied = true;
        self
    }

    pub fn simulate_after(mut self, simulate_after: bool) -> Self {
        self.simulate_after = simulate_after;
        self
    }

    /// The goal's own resource constraints, or for a conditional goal, its inner goal's.
    pub fn effective_resource_constraints(&self) -> Option<&WindowsExpression> {
        match (&self.resource_constraints, &self.kind) {
            (Some(constraints), _) => Some(constraints),
            (None, GoalKind::Conditional { goal, .. }) => goal.effective_resource_constraints(),
            (None, _) => None,
        }
    }

    /// What the plan is still missing for this goal.
    pub fn conflicts(
        &self,
        plan: &Plan,
        results: &SimulationResults,
        horizon: &PlanningHorizon,
    ) -> Result<Vec<Conflict>, EvaluationError> {
        let context = self.temporal_context.evaluate(
            results,
            horizon.interval(),
            &EvaluationEnvironment::default(),
        )?;
        let scope = GoalScope {
            owner: self.id,
            plan,
            results,
            horizon,
        };
        self.kind.conflicts(&scope, &context)
    }
}

/// What a goal kind needs to look at while listing conflicts.
pub(crate) struct GoalScope<'a> {
    /// The goal that associations are checked against.
    pub owner: GoalId,
    pub plan: &'a Plan,
    pub results: &'a SimulationResults,
    pub horizon: &'a PlanningHorizon,
}

impl GoalScope<'_> {
    /// `None` if one of `matching` is already associated with the owner. Otherwise a
    /// conflict asking for one of them to be.
    pub(crate) fn missing_association(
        &self,
        matching: Vec<SchedulingActivityDirective>,
        temporal_context: Windows,
        env: EvaluationEnvironment,
    ) -> Option<Conflict> {
        let associated = matching
            .iter()
            .any(|a| self.plan.evaluation.is_associated(self.owner, a.id));
        (!associated).then(|| Conflict::MissingAssociation {
            goal: self.owner,
            candidates: matching,
            temporal_context,
            env,
        })
    }
}

impl GoalKind {
    fn conflicts(&self, scope: &GoalScope, context: &Windows) -> Result<Vec<Conflict>, EvaluationError> {
        match self {
            GoalKind::Recurrence(goal) => Ok(goal.conflicts(scope, context)),
            GoalKind::Coexistence(goal) => goal.conflicts(scope, context),
            GoalKind::Cardinality(goal) => Ok(goal.conflicts(scope, context)),
            GoalKind::Procedural(goal) => Ok(goal.conflicts(scope, context)),
            GoalKind::Conditional { condition, goal } => {
                let bounds = scope.horizon.interval();
                let env = EvaluationEnvironment::default();
                let holds = condition.evaluate(scope.results, bounds, &env)?;
                let inner = goal.temporal_context.evaluate(scope.results, bounds, &env)?;
                goal.kind.conflicts(scope, &inner.and(context).and(&holds))
            }
            GoalKind::And(_) | GoalKind::Or { .. } => Ok(vec![]),
        }
    }
}
