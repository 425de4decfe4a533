use super::GoalScope;
use crate::activity::ActivityCreationTemplate;
use crate::conflicts::Conflict;
use crate::constraints::EvaluationEnvironment;
use crate::windows::Windows;
use hifitime::Duration;

/// Each true segment of the temporal context needs enough matching activities, by
/// count, by combined duration, or both.
#[derive(Clone, Debug, PartialEq)]
pub struct CardinalityGoal {
    pub template: ActivityCreationTemplate,
    pub min_occurrences: Option<usize>,
    pub min_total_duration: Option<Duration>,
}

impl CardinalityGoal {
    pub fn new(template: ActivityCreationTemplate) -> Self {
        Self {
            template,
            min_occurrences: None,
            min_total_duration: None,
        }
    }

    pub fn at_least(mut self, occurrences: usize) -> Self {
        self.min_occurrences = Some(occurrences);
        self
    }

    pub fn lasting_at_least(mut self, total: Duration) -> Self {
        self.min_total_duration = Some(total);
        self
    }

    pub(crate) fn conflicts(&self, scope: &GoalScope, context: &Windows) -> Vec<Conflict> {
        let mut conflicts = vec![];
        for interval in context.true_intervals() {
            let temporal_context = Windows::of(interval, true);
            let matching: Vec<_> = scope
                .plan
                .activities()
                .filter(|a| self.template.matches(a) && interval.contains(a.start_offset))
                .cloned()
                .collect();

            for activity in &matching {
                if let Some(conflict) = scope.missing_association(
                    vec![activity.clone()],
                    temporal_context.clone(),
                    EvaluationEnvironment::default(),
                ) {
                    conflicts.push(conflict);
                }
            }

            let missing = self
                .min_occurrences
                .map_or(0, |min| min.saturating_sub(matching.len()));
            let total = matching
                .iter()
                .filter_map(|a| a.duration)
                .fold(Duration::ZERO, |total, d| total + d);
            let too_short = self.min_total_duration.is_some_and(|min| total < min);
            if missing > 0 || too_short {
                conflicts.push(Conflict::MissingActivityTemplate {
                    goal: scope.owner,
                    template: self.template.clone(),
                    temporal_context,
                    cardinality: Some(missing.max(1)),
                    env: EvaluationEnvironment::default(),
                });
            }
        }
        conflicts
    }
}
