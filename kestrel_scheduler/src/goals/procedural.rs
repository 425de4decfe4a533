use super::GoalScope;
use crate::activity::SchedulingActivityDirective;
use crate::conflicts::Conflict;
use crate::constraints::EvaluationEnvironment;
use crate::plan::Plan;
use crate::windows::Windows;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

type Generator = Arc<dyn Fn(&Plan) -> Vec<SchedulingActivityDirective> + Send + Sync>;

/// The plan must contain exactly the activities a generator asks for.
///
/// Generated activities are compared by properties, so the generator may hand out
/// fresh ids every time it runs.
#[derive(Clone)]
pub struct ProceduralGoal {
    generator: Generator,
}

impl ProceduralGoal {
    pub fn new(
        generator: impl Fn(&Plan) -> Vec<SchedulingActivityDirective> + Send + Sync + 'static,
    ) -> Self {
        Self {
            generator: Arc::new(generator),
        }
    }

    pub(crate) fn conflicts(&self, scope: &GoalScope, context: &Windows) -> Vec<Conflict> {
        let mut conflicts = vec![];
        for wanted in (self.generator)(scope.plan) {
            if context.value_at(wanted.start_offset) != Some(true) {
                continue;
            }
            let existing: Vec<_> = scope
                .plan
                .activities()
                .filter(|a| a.equals_in_properties(&wanted))
                .cloned()
                .collect();
            if existing.is_empty() {
                conflicts.push(Conflict::MissingActivityInstance {
                    goal: scope.owner,
                    temporal_context: Windows::of(wanted.interval(), true),
                    instance: wanted,
                    env: EvaluationEnvironment::default(),
                });
            } else if let Some(conflict) = scope.missing_association(
                existing,
                Windows::of(wanted.interval(), true),
                EvaluationEnvironment::default(),
            ) {
                conflicts.push(conflict);
            }
        }
        conflicts
    }
}

impl Debug for ProceduralGoal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProceduralGoal").finish_non_exhaustive()
    }
}
