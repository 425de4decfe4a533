use crate::config::Placement;
use crate::constraints::WindowsExpression;
use crate::error::SimulationException;
use crate::facade::SimulationFacade;
use crate::time::Interval;
use crate::windows::Windows;
use hifitime::Duration;
use kestrel::{
    ActivityDirective, ActivityDirectiveId, Arguments, DurationType, InstantiationError,
    SerializedActivity, SerializedValue, StartAnchor,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> ActivityDirectiveId {
    ActivityDirectiveId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// An activity as the scheduler sees it: where it starts, and how long it runs if known.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchedulingActivityDirective {
    pub id: ActivityDirectiveId,
    pub type_name: String,
    pub start_offset: Duration,
    pub duration: Option<Duration>,
    pub arguments: Arguments,
    /// The directive this one is anchored to, and whether to its start.
    pub anchor: Option<(ActivityDirectiveId, bool)>,
    /// For activities spawned by another activity, the directive at the top of the chain.
    pub top_parent: Option<ActivityDirectiveId>,
    /// Whether the scheduler created this activity, rather than finding it in the plan.
    pub is_new: bool,
}

impl SchedulingActivityDirective {
    /// A new activity with a fresh id.
    pub fn new(type_name: impl Into<String>, start_offset: Duration, arguments: Arguments) -> Self {
        Self {
            id: next_id(),
            type_name: type_name.into(),
            start_offset,
            duration: None,
            arguments,
            anchor: None,
            top_parent: None,
            is_new: true,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<SerializedValue>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    pub fn anchored_to(mut self, anchor: ActivityDirectiveId, to_start: bool) -> Self {
        self.anchor = Some((anchor, to_start));
        self
    }

    /// Marks the activity as part of the plan the scheduler was given.
    pub fn existing(mut self) -> Self {
        self.is_new = false;
        self
    }

    /// The same activity, with the same id, placed somewhere else.
    pub fn placed_at(&self, start_offset: Duration) -> Self {
        Self {
            start_offset,
            ..self.clone()
        }
    }

    pub fn end_offset(&self) -> Option<Duration> {
        self.duration.map(|d| self.start_offset + d)
    }

    /// From start to end, or just the start instant if the duration is unknown.
    pub fn interval(&self) -> Interval {
        Interval::between(
            self.start_offset,
            self.end_offset().unwrap_or(self.start_offset),
        )
    }

    pub fn serialized(&self) -> SerializedActivity {
        SerializedActivity {
            type_name: self.type_name.clone(),
            arguments: self.arguments.clone(),
        }
    }

    pub fn directive(&self) -> ActivityDirective {
        let directive = ActivityDirective::new(self.start_offset, self.serialized());
        match self.anchor {
            Some((anchor, true)) => directive.anchored(StartAnchor::DirectiveStart(anchor)),
            Some((anchor, false)) => directive.anchored(StartAnchor::DirectiveEnd(anchor)),
            None => directive,
        }
    }

    /// Equal in everything that matters to the plan. Ids and provenance are ignored.
    pub fn equals_in_properties(&self, other: &SchedulingActivityDirective) -> bool {
        self.type_name == other.type_name
            && self.start_offset == other.start_offset
            && self.duration == other.duration
            && self.arguments == other.arguments
            && self.anchor == other.anchor
    }
}

/// Matches activities by type, arguments, start and duration.
///
/// Arguments only need to be present and equal on the activity; it may have others.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityExpression {
    pub type_name: Option<String>,
    pub arguments: Arguments,
    pub start_range: Option<Interval>,
    pub duration_range: Option<Interval>,
}

impl ActivityExpression {
    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Self::default()
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<SerializedValue>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    pub fn starting_in(mut self, range: Interval) -> Self {
        self.start_range = Some(range);
        self
    }

    pub fn lasting(mut self, range: Interval) -> Self {
        self.duration_range = Some(range);
        self
    }

    pub fn matches(&self, activity: &SchedulingActivityDirective) -> bool {
        self.type_name
            .as_ref()
            .is_none_or(|name| name == &activity.type_name)
            && self
                .arguments
                .iter()
                .all(|(name, value)| activity.arguments.get(name) == Some(value))
            && self
                .start_range
                .is_none_or(|range| range.contains(activity.start_offset))
            && self.duration_range.is_none_or(|range| {
                activity.duration.is_some_and(|d| range.contains(d))
            })
    }
}

/// What the scheduler knows about an activity type.
#[derive(Clone, Debug, PartialEq)]
pub struct ActivityType {
    pub name: String,
    pub duration_type: DurationType,
    /// Where activities of this type are allowed to be.
    pub state_constraint: Option<WindowsExpression>,
}

/// A recipe for activities the scheduler may create.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityCreationTemplate {
    pub type_name: String,
    pub arguments: Arguments,
    /// For controllable types, the duration to ask for.
    pub duration: Option<Duration>,
}

impl ActivityCreationTemplate {
    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            arguments: Arguments::new(),
            duration: None,
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<SerializedValue>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn expression(&self) -> ActivityExpression {
        ActivityExpression {
            type_name: Some(self.type_name.clone()),
            arguments: self.arguments.clone(),
            start_range: None,
            duration_range: self.duration.map(Interval::at),
        }
    }

    pub fn matches(&self, activity: &SchedulingActivityDirective) -> bool {
        self.expression().matches(activity)
    }

    /// Places a new activity so that it starts inside `windows` and ends inside the horizon.
    ///
    /// Durations come from the activity type. Uncontrollable ones are found by simulating
    /// the candidate and taking it back out again.
    pub fn create_activity(
        &self,
        windows: &Windows,
        facade: &mut SimulationFacade,
        placement: Placement,
    ) -> Result<Option<SchedulingActivityDirective>, SimulationException> {
        let horizon_end = facade.horizon().end_offset();
        let duration_type = facade
            .model()
            .directive_type(&self.type_name)
            .cloned()
            .ok_or_else(|| InstantiationError::UnknownType {
                type_name: self.type_name.clone(),
            })?;

        let mut arguments = self.arguments.clone();
        let known = match &duration_type {
            DurationType::Fixed(duration) => Some(*duration),
            DurationType::Controllable { parameter } => match self.duration {
                Some(duration) => {
                    arguments.insert(parameter.clone(), duration.into());
                    Some(duration)
                }
                None => arguments.get(parameter).and_then(SerializedValue::as_duration),
            },
            DurationType::Uncontrollable => None,
        };

        let mut intervals: Vec<Interval> = windows.true_intervals().collect();
        if placement == Placement::Latest {
            intervals.reverse();
        }
        let template = SchedulingActivityDirective::new(&self.type_name, Duration::ZERO, arguments);

        for interval in intervals {
            let earliest = interval.start.max(Duration::ZERO);
            let latest = interval.end.min(horizon_end);
            if latest < earliest {
                continue;
            }
            let preferred = match placement {
                Placement::Latest => latest,
                Placement::Earliest => earliest,
            };
            let duration = match known {
                Some(duration) => duration,
                None => match facade.probe_activity_duration(&template.placed_at(preferred))? {
                    Some(duration) => duration,
                    None => continue,
                },
            };
            let start = if preferred + duration > horizon_end {
                horizon_end - duration
            } else {
                preferred
            };
            if start < earliest || start > latest {
                continue;
            }
            if known.is_none()
                && start != preferred
                && facade.probe_activity_duration(&template.placed_at(start))? != Some(duration)
            {
                continue;
            }
            return Ok(Some(template.placed_at(start).with_duration(duration)));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hifitime::TimeUnits;

    #[test]
    fn property_equality_ignores_ids() {
        let a = SchedulingActivityDirective::new("BiteBanana", 1.seconds(), Arguments::new())
            .with_argument("biteSize", 0.1);
        let b = a.placed_at(1.seconds());
        let c = SchedulingActivityDirective::new("BiteBanana", 1.seconds(), Arguments::new())
            .with_argument("biteSize", 0.1)
            .existing();

        assert_ne!(a.id, c.id);
        assert!(a.equals_in_properties(&c));
        assert!(a.equals_in_properties(&b));
        assert!(!a.equals_in_properties(&a.placed_at(2.seconds())));
    }

    #[test]
    fn expressions_match_subsets_of_arguments() {
        let activity = SchedulingActivityDirective::new("GrowBanana", 3.seconds(), Arguments::new())
            .with_argument("quantity", 2)
            .with_argument("growingDuration", 1.seconds())
            .with_duration(1.seconds());

        assert!(ActivityExpression::of_type("GrowBanana").matches(&activity));
        assert!(
            ActivityExpression::of_type("GrowBanana")
                .with_argument("quantity", 2)
                .starting_in(Interval::between(0.seconds(), 5.seconds()))
                .matches(&activity)
        );
        assert!(!ActivityExpression::of_type("GrowBanana").with_argument("quantity", 3).matches(&activity));
        assert!(!ActivityExpression::of_type("PeelBanana").matches(&activity));
        assert!(
            !ActivityCreationTemplate::of_type("GrowBanana")
                .with_duration(2.seconds())
                .matches(&activity)
        );
    }
}
