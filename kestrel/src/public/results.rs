use crate::internal::timeline::{EventGraph, duration_to_epoch, epoch_to_duration};
use crate::public::cell::TopicId;
use crate::public::directive::{ActivityDirectiveId, Arguments};
use crate::public::error::PersistenceError;
use crate::public::value::SerializedValue;
use bincode::config::standard;
use derive_more::Display;
use hifitime::{Duration, Epoch as Time};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value changing linearly over time. `rate` is per second.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RealDynamics {
    pub initial: f64,
    pub rate: f64,
}

impl RealDynamics {
    pub fn constant(value: f64) -> Self {
        Self {
            initial: value,
            rate: 0.0,
        }
    }

    pub fn linear(initial: f64, rate: f64) -> Self {
        Self { initial, rate }
    }

    pub fn value_at(&self, elapsed: Duration) -> f64 {
        self.initial + self.rate * elapsed.to_seconds()
    }

    pub fn evolved(&self, elapsed: Duration) -> Self {
        Self {
            initial: self.value_at(elapsed),
            rate: self.rate,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileSegment<D> {
    pub extent: Duration,
    pub dynamics: D,
}

pub type Profile<D> = Vec<ProfileSegment<D>>;

/// Finds the dynamics in effect at `offset`, and how far into its segment `offset` is.
///
/// Segments include their start and exclude their end, except the last one which
/// includes the end of the profile.
pub fn profile_at<D>(profile: &[ProfileSegment<D>], offset: Duration) -> Option<(&D, Duration)> {
    let mut start = Duration::ZERO;
    for (i, segment) in profile.iter().enumerate() {
        let end = start + segment.extent;
        let last = i + 1 == profile.len();
        if offset >= start && (offset < end || (last && offset <= end)) {
            return Some((&segment.dynamics, offset - start));
        }
        start = end;
    }
    None
}

/// A profile segment the way storage keeps it: a start offset and possibly a gap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredSegment<D> {
    pub start_offset: Duration,
    pub dynamics: Option<D>,
}

pub fn stored_segments<D: Clone>(profile: &[ProfileSegment<Option<D>>]) -> Vec<StoredSegment<D>> {
    let mut start_offset = Duration::ZERO;
    profile
        .iter()
        .map(|segment| {
            let stored = StoredSegment {
                start_offset,
                dynamics: segment.dynamics.clone(),
            };
            start_offset += segment.extent;
            stored
        })
        .collect()
}

/// Rebuilds `(extent, dynamics)` segments from stored rows by differencing consecutive offsets.
///
/// The last segment runs until `profile_duration`.
pub fn profile_from_stored<D: Clone>(
    rows: &[StoredSegment<D>],
    profile_duration: Duration,
) -> Result<Profile<Option<D>>, PersistenceError> {
    if rows.is_empty() {
        return Err(PersistenceError::NoSegments);
    }
    let mut rows = rows.to_vec();
    rows.sort_by(|a, b| a.start_offset.cmp(&b.start_offset));

    let mut segments = Vec::with_capacity(rows.len());
    for window in rows.windows(2) {
        segments.push(ProfileSegment {
            extent: window[1].start_offset - window[0].start_offset,
            dynamics: window[0].dynamics.clone(),
        });
    }
    let last = &rows[rows.len() - 1];
    segments.push(ProfileSegment {
        extent: profile_duration - last.start_offset,
        dynamics: last.dynamics.clone(),
    });
    Ok(segments)
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[display("span {_0}")]
pub struct SpanId(pub u64);

/// One simulated activity instance, finished or not.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivitySpan {
    pub type_name: String,
    pub arguments: Arguments,
    pub start_offset: Duration,
    /// `None` if the activity was still running when the results were taken.
    pub duration: Option<Duration>,
    pub parent: Option<SpanId>,
    pub children: Vec<SpanId>,
    pub directive_id: Option<ActivityDirectiveId>,
    pub computed_attributes: Option<SerializedValue>,
}

impl ActivitySpan {
    pub fn is_finished(&self) -> bool {
        self.duration.is_some()
    }

    pub fn end_offset(&self) -> Option<Duration> {
        self.duration.map(|d| self.start_offset + d)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopicRecord {
    pub id: TopicId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub topic: TopicId,
    pub value: SerializedValue,
}

mod tai {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &Time, serializer: S) -> Result<S::Ok, S::Error> {
        epoch_to_duration(*time).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Time, D::Error> {
        Duration::deserialize(deserializer).map(duration_to_epoch)
    }
}

/// Everything a simulation run produced, relative to its start time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationResults {
    #[serde(with = "tai")]
    pub start_time: Time,
    pub duration: Duration,
    pub real_profiles: BTreeMap<String, Profile<RealDynamics>>,
    pub discrete_profiles: BTreeMap<String, Profile<SerializedValue>>,
    pub activities: BTreeMap<SpanId, ActivitySpan>,
    pub topics: Vec<TopicRecord>,
    pub events: BTreeMap<Duration, Vec<EventGraph<EventRecord>>>,
}

impl SimulationResults {
    pub fn sample_real(&self, resource: &str, offset: Duration) -> Option<f64> {
        let profile = self.real_profiles.get(resource)?;
        profile_at(profile, offset).map(|(dynamics, into)| dynamics.value_at(into))
    }

    pub fn sample_discrete(&self, resource: &str, offset: Duration) -> Option<&SerializedValue> {
        let profile = self.discrete_profiles.get(resource)?;
        profile_at(profile, offset).map(|(value, _)| value)
    }

    pub fn span_for_directive(&self, id: ActivityDirectiveId) -> Option<(SpanId, &ActivitySpan)> {
        self.activities
            .iter()
            .find(|(_, span)| span.directive_id == Some(id))
            .map(|(span_id, span)| (*span_id, span))
    }

    /// Follows parent links up to the outermost span.
    pub fn root_of(&self, mut span: SpanId) -> SpanId {
        while let Some(parent) = self.activities.get(&span).and_then(|s| s.parent) {
            span = parent;
        }
        span
    }

    pub fn encode(&self) -> Result<Vec<u8>, PersistenceError> {
        Ok(bincode::serde::encode_to_vec(self, standard())?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PersistenceError> {
        Ok(bincode::serde::decode_from_slice(bytes, standard())?.0)
    }
}
