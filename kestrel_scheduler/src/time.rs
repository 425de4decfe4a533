use derive_more::Display;
use hifitime::{Duration, Epoch as Time};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Inclusivity {
    Inclusive,
    Exclusive,
}

/// A span of offsets from the plan start.
///
/// Offsets are counted in whole nanoseconds, so every interval is the same set of
/// instants as some closed interval. Equality compares those sets: `[0, 2s)` equals
/// `[0, 2s - 1ns]`, and all empty intervals are equal.
#[derive(Copy, Clone, Serialize, Deserialize)]
pub struct Interval {
    pub start: Duration,
    pub start_inclusivity: Inclusivity,
    pub end: Duration,
    pub end_inclusivity: Inclusivity,
}

impl Interval {
    pub const FOREVER: Interval = Interval {
        start: Duration::MIN,
        start_inclusivity: Inclusivity::Inclusive,
        end: Duration::MAX,
        end_inclusivity: Inclusivity::Inclusive,
    };

    pub fn new(
        start: Duration,
        start_inclusivity: Inclusivity,
        end: Duration,
        end_inclusivity: Inclusivity,
    ) -> Self {
        Self {
            start,
            start_inclusivity,
            end,
            end_inclusivity,
        }
    }

    /// Both ends included.
    pub fn between(start: Duration, end: Duration) -> Self {
        Self::new(start, Inclusivity::Inclusive, end, Inclusivity::Inclusive)
    }

    /// Start included, end excluded.
    pub fn half_open(start: Duration, end: Duration) -> Self {
        Self::new(start, Inclusivity::Inclusive, end, Inclusivity::Exclusive)
    }

    pub fn at(instant: Duration) -> Self {
        Self::between(instant, instant)
    }

    /// The first and last nanosecond covered, if any.
    pub(crate) fn closed(&self) -> Option<(i128, i128)> {
        let mut first = self.start.total_nanoseconds();
        let mut last = self.end.total_nanoseconds();
        if self.start_inclusivity == Inclusivity::Exclusive {
            first += 1;
        }
        if self.end_inclusivity == Inclusivity::Exclusive {
            last -= 1;
        }
        (first <= last).then_some((first, last))
    }

    pub(crate) fn from_closed(first: i128, last: i128) -> Self {
        Self::between(from_nanos(first), from_nanos(last))
    }

    pub fn is_empty(&self) -> bool {
        self.closed().is_none()
    }

    pub fn contains(&self, instant: Duration) -> bool {
        let t = instant.total_nanoseconds();
        self.closed()
            .is_some_and(|(first, last)| first <= t && t <= last)
    }

    /// Whether every instant of `other` is in `self`.
    pub fn contains_interval(&self, other: &Interval) -> bool {
        match (self.closed(), other.closed()) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some((a, b)), Some((c, d))) => a <= c && d <= b,
        }
    }

    /// Distance from start to end, ignoring inclusivity.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

pub(crate) fn from_nanos(nanos: i128) -> Duration {
    Duration::from_total_nanoseconds(nanos)
}

impl PartialEq for Interval {
    fn eq(&self, other: &Self) -> bool {
        self.closed() == other.closed()
    }
}

impl Eq for Interval {}

impl Debug for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let open = match self.start_inclusivity {
            Inclusivity::Inclusive => '[',
            Inclusivity::Exclusive => '(',
        };
        let close = match self.end_inclusivity {
            Inclusivity::Inclusive => ']',
            Inclusivity::Exclusive => ')',
        };
        write!(f, "{open}{}, {}{close}", self.start, self.end)
    }
}

/// The absolute time range a scheduling run is allowed to use.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize, Display)]
#[display("{start} to {end}")]
pub struct PlanningHorizon {
    pub start: Time,
    pub end: Time,
}

impl PlanningHorizon {
    pub fn new(start: Time, end: Time) -> Self {
        Self { start, end }
    }

    pub fn starting_at(start: Time, duration: Duration) -> Self {
        Self {
            start,
            end: start + duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// The end of the horizon, as an offset from its start.
    pub fn end_offset(&self) -> Duration {
        self.duration()
    }

    pub fn interval(&self) -> Interval {
        Interval::between(Duration::ZERO, self.duration())
    }

    pub fn to_offset(&self, time: Time) -> Duration {
        time - self.start
    }

    pub fn to_time(&self, offset: Duration) -> Time {
        self.start + offset
    }
}
