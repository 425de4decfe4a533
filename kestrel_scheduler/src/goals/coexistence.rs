use super::GoalScope;
use crate::activity::{ActivityCreationTemplate, ActivityExpression, SchedulingActivityDirective};
use crate::conflicts::Conflict;
use crate::constraints::{EvaluationEnvironment, WindowsExpression};
use crate::error::EvaluationError;
use crate::time::Interval;
use crate::windows::Windows;
use hifitime::Duration;

/// What a coexistence goal follows.
#[derive(Clone, Debug, PartialEq)]
pub enum CoexistenceAnchor {
    /// Each true segment.
    Windows(WindowsExpression),
    /// Each matching activity in the plan.
    Activities(ActivityExpression),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimeAnchor {
    Start,
    End,
}

/// For every anchor, an activity matching the template must start at the anchor's
/// start or end, shifted by `offset`.
#[derive(Clone, Debug, PartialEq)]
pub struct CoexistenceGoal {
    pub for_each: CoexistenceAnchor,
    pub template: ActivityCreationTemplate,
    pub starts_at: TimeAnchor,
    pub offset: Duration,
    /// Binds each anchor under this name while its conflict is resolved.
    pub alias: Option<String>,
}

impl CoexistenceGoal {
    pub fn new(for_each: CoexistenceAnchor, template: ActivityCreationTemplate) -> Self {
        Self {
            for_each,
            template,
            starts_at: TimeAnchor::Start,
            offset: Duration::ZERO,
            alias: None,
        }
    }

    pub fn starts_at(mut self, anchor: TimeAnchor) -> Self {
        self.starts_at = anchor;
        self
    }

    pub fn offset_by(mut self, offset: Duration) -> Self {
        self.offset = offset;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    fn anchors(
        &self,
        scope: &GoalScope,
        context: &Windows,
    ) -> Result<Vec<(Interval, Option<SchedulingActivityDirective>)>, EvaluationError> {
        Ok(match &self.for_each {
            CoexistenceAnchor::Windows(expression) => expression
                .evaluate(
                    scope.results,
                    scope.horizon.interval(),
                    &EvaluationEnvironment::default(),
                )?
                .and(context)
                .true_intervals()
                .map(|interval| (interval, None))
                .collect(),
            CoexistenceAnchor::Activities(expression) => scope
                .plan
                .activities()
                .filter(|a| {
                    expression.matches(a) && context.value_at(a.start_offset) == Some(true)
                })
                .map(|a| (a.interval(), Some(a.clone())))
                .collect(),
        })
    }

    pub(crate) fn conflicts(
        &self,
        scope: &GoalScope,
        context: &Windows,
    ) -> Result<Vec<Conflict>, EvaluationError> {
        let mut conflicts = vec![];
        for (interval, activity) in self.anchors(scope, context)? {
            let target = match self.starts_at {
                TimeAnchor::Start => interval.start,
                TimeAnchor::End => interval.end,
            } + self.offset;
            if !scope.horizon.interval().contains(target) {
                continue;
            }

            let mut env = EvaluationEnvironment::default();
            if let Some(alias) = &self.alias {
                env = env.with_interval(alias.clone(), interval);
                if let Some(activity) = activity {
                    env = env.with_activity(alias.clone(), activity);
                }
            }

            let matching: Vec<_> = scope
                .plan
                .activities()
                .filter(|a| self.template.matches(a) && a.start_offset == target)
                .cloned()
                .collect();
            let temporal_context = Windows::of(Interval::at(target), true);
            if matching.is_empty() {
                conflicts.push(Conflict::MissingActivityTemplate {
                    goal: scope.owner,
                    template: self.template.clone(),
                    temporal_context,
                    cardinality: None,
                    env,
                });
            } else if let Some(conflict) =
                scope.missing_association(matching, temporal_context, env)
            {
                conflicts.push(conflict);
            }
        }
        Ok(conflicts)
    }
}
