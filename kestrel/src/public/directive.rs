use crate::public::value::SerializedValue;
use derive_more::Display;
use hifitime::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted identity of a user-level activity directive.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[display("directive {_0}")]
pub struct ActivityDirectiveId(pub u64);

impl From<ActivityDirectiveId> for SerializedValue {
    fn from(id: ActivityDirectiveId) -> Self {
        SerializedValue::Int(id.0 as i64)
    }
}

pub type Arguments = BTreeMap<String, SerializedValue>;

/// An activity type name plus its arguments, before the mission model has
/// turned it into a task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedActivity {
    pub type_name: String,
    pub arguments: Arguments,
}

impl SerializedActivity {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            arguments: Arguments::new(),
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<SerializedValue>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }
}

/// What a directive's start offset is measured from.
///
/// Anchoring to another directive's start is resolved before simulation; anchoring to
/// its end can only be resolved once that directive has finished simulating.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartAnchor {
    #[default]
    PlanStart,
    PlanEnd,
    DirectiveStart(ActivityDirectiveId),
    DirectiveEnd(ActivityDirectiveId),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityDirective {
    pub activity: SerializedActivity,
    pub start_offset: Duration,
    pub anchor: StartAnchor,
}

impl ActivityDirective {
    pub fn new(start_offset: Duration, activity: SerializedActivity) -> Self {
        Self {
            activity,
            start_offset,
            anchor: StartAnchor::PlanStart,
        }
    }

    pub fn anchored(mut self, anchor: StartAnchor) -> Self {
        self.anchor = anchor;
        self
    }
}
