use super::GoalScope;
use crate::activity::ActivityCreationTemplate;
use crate::conflicts::Conflict;
use crate::constraints::EvaluationEnvironment;
use crate::time::{Inclusivity, Interval};
use crate::windows::Windows;
use hifitime::Duration;

/// Some activity matching the template must start in every period of `every`.
#[derive(Clone, Debug, PartialEq)]
pub struct RecurrenceGoal {
    pub template: ActivityCreationTemplate,
    pub every: Duration,
}

impl RecurrenceGoal {
    pub fn new(template: ActivityCreationTemplate, every: Duration) -> Self {
        Self { template, every }
    }

    pub(crate) fn conflicts(&self, scope: &GoalScope, context: &Windows) -> Vec<Conflict> {
        let mut conflicts = vec![];
        for interval in context.true_intervals() {
            let mut slot = interval.start;
            while slot <= interval.end {
                let next = slot + self.every;
                let period = if next > interval.end {
                    Interval::between(slot, interval.end)
                } else {
                    Interval::new(slot, Inclusivity::Inclusive, next, Inclusivity::Exclusive)
                };
                let matching: Vec<_> = scope
                    .plan
                    .activities()
                    .filter(|a| self.template.matches(a) && period.contains(a.start_offset))
                    .cloned()
                    .collect();

                if matching.is_empty() {
                    conflicts.push(Conflict::MissingActivityTemplate {
                        goal: scope.owner,
                        template: self.template.clone(),
                        temporal_context: Windows::of(Interval::at(slot), true),
                        cardinality: None,
                        env: EvaluationEnvironment::default(),
                    });
                } else if let Some(conflict) = scope.missing_association(
                    matching,
                    Windows::of(period, true),
                    EvaluationEnvironment::default(),
                ) {
                    conflicts.push(conflict);
                }

                if self.every <= Duration::ZERO {
                    break;
                }
                slot = next;
            }
        }
        conflicts
    }
}
