use crate::activity::{ActivityCreationTemplate, SchedulingActivityDirective};
use crate::constraints::EvaluationEnvironment;
use crate::goals::GoalId;
use crate::windows::Windows;

/// Something a goal still needs from the plan.
///
/// The temporal context is where the missing piece could legally start.
#[derive(Clone, Debug, PartialEq)]
pub enum Conflict {
    /// A specific activity should be in the plan.
    MissingActivityInstance {
        goal: GoalId,
        instance: SchedulingActivityDirective,
        temporal_context: Windows,
        env: EvaluationEnvironment,
    },
    /// Some activity made from the template should be in the plan.
    MissingActivityTemplate {
        goal: GoalId,
        template: ActivityCreationTemplate,
        temporal_context: Windows,
        /// How many more are needed, when the goal counts.
        cardinality: Option<usize>,
        env: EvaluationEnvironment,
    },
    /// One of these activities would do, if it were associated with the goal.
    MissingAssociation {
        goal: GoalId,
        candidates: Vec<SchedulingActivityDirective>,
        temporal_context: Windows,
        env: EvaluationEnvironment,
    },
}

impl Conflict {
    pub fn goal(&self) -> GoalId {
        match self {
            Conflict::MissingActivityInstance { goal, .. }
            | Conflict::MissingActivityTemplate { goal, .. }
            | Conflict::MissingAssociation { goal, .. } => *goal,
        }
    }

    pub fn temporal_context(&self) -> &Windows {
        match self {
            Conflict::MissingActivityInstance {
                temporal_context, ..
            }
            | Conflict::MissingActivityTemplate {
                temporal_context, ..
            }
            | Conflict::MissingAssociation {
                temporal_context, ..
            } => temporal_context,
        }
    }

    pub fn env(&self) -> &EvaluationEnvironment {
        match self {
            Conflict::MissingActivityInstance { env, .. }
            | Conflict::MissingActivityTemplate { env, .. }
            | Conflict::MissingAssociation { env, .. } => env,
        }
    }

    /// The type of activity that would resolve this, if the conflict asks for a new one.
    pub fn activity_type(&self) -> Option<&str> {
        match self {
            Conflict::MissingActivityInstance { instance, .. } => Some(&instance.type_name),
            Conflict::MissingActivityTemplate { template, .. } => Some(&template.type_name),
            Conflict::MissingAssociation { .. } => None,
        }
    }
}
