use crate::time::{Interval, from_nanos};
use hifitime::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A boolean function of time that may be undefined in places.
///
/// Stored as segments in ascending order that never overlap, with every interval in
/// closed form. Two touching segments never share a value. Time not covered by a
/// segment is a gap: the value there is unknown.
///
/// [Windows::and] and [Windows::or] follow Kleene logic, so `false & gap` is `false`
/// and `true | gap` is `true`, while `true & gap` and `false | gap` stay gaps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Windows {
    segments: Vec<(Interval, bool)>,
}

type Raw = (i128, i128, bool);

impl Windows {
    /// Undefined everywhere.
    pub fn new() -> Self {
        Self::default()
    }

    /// `value` over `interval`, undefined elsewhere.
    pub fn of(interval: Interval, value: bool) -> Self {
        Self::new().set(interval, value)
    }

    pub fn from_segments(segments: impl IntoIterator<Item = (Interval, bool)>) -> Self {
        segments
            .into_iter()
            .fold(Self::new(), |windows, (interval, value)| {
                windows.set(interval, value)
            })
    }

    /// False over `bounds`, except true over each of `intervals`.
    pub fn from_true_intervals(
        bounds: Interval,
        intervals: impl IntoIterator<Item = Interval>,
    ) -> Self {
        intervals
            .into_iter()
            .fold(Self::of(bounds, false), |windows, interval| {
                windows.set(interval, true)
            })
    }

    fn raw(&self) -> Vec<Raw> {
        self.segments
            .iter()
            .filter_map(|(interval, value)| interval.closed().map(|(a, b)| (a, b, *value)))
            .collect()
    }

    /// Merges touching segments with equal values. Input must be sorted and disjoint.
    fn from_raw(raw: impl IntoIterator<Item = Raw>) -> Self {
        let mut merged: Vec<Raw> = vec![];
        for (a, b, value) in raw {
            match merged.last_mut() {
                Some(last) if last.2 == value && last.1 + 1 >= a => last.1 = last.1.max(b),
                _ => merged.push((a, b, value)),
            }
        }
        Self {
            segments: merged
                .into_iter()
                .map(|(a, b, value)| (Interval::from_closed(a, b), value))
                .collect(),
        }
    }

    fn value_at_nanos(raw: &[Raw], t: i128) -> Option<bool> {
        let i = raw.partition_point(|(_, b, _)| *b < t);
        raw.get(i).filter(|(a, _, _)| *a <= t).map(|(_, _, v)| *v)
    }

    pub fn value_at(&self, instant: Duration) -> Option<bool> {
        Self::value_at_nanos(&self.raw(), instant.total_nanoseconds())
    }

    /// Overwrites the value over `interval`.
    pub fn set(self, interval: Interval, value: bool) -> Self {
        let Some((first, last)) = interval.closed() else {
            return self;
        };
        let mut raw = vec![];
        for (a, b, v) in self.raw() {
            if b < first || a > last {
                raw.push((a, b, v));
                continue;
            }
            if a < first {
                raw.push((a, first - 1, v));
            }
            if b > last {
                raw.push((last + 1, b, v));
            }
        }
        raw.push((first, last, value));
        raw.sort_by_key(|(a, _, _)| *a);
        Self::from_raw(raw)
    }

    /// Combines two windows pointwise. `f` sees `None` where a side is undefined.
    fn combine(
        &self,
        other: &Windows,
        f: impl Fn(Option<bool>, Option<bool>) -> Option<bool>,
    ) -> Self {
        let left = self.raw();
        let right = other.raw();
        let mut points = BTreeSet::new();
        for (a, b, _) in left.iter().chain(right.iter()) {
            points.insert(*a);
            points.insert(*b + 1);
        }
        let points: Vec<i128> = points.into_iter().collect();
        let raw = points.windows(2).filter_map(|pair| {
            let (start, next) = (pair[0], pair[1]);
            f(
                Self::value_at_nanos(&left, start),
                Self::value_at_nanos(&right, start),
            )
            .map(|value| (start, next - 1, value))
        });
        Self::from_raw(raw.collect::<Vec<_>>())
    }

    pub fn and(&self, other: &Windows) -> Self {
        self.combine(other, |a, b| match (a, b) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        })
    }

    pub fn or(&self, other: &Windows) -> Self {
        self.combine(other, |a, b| match (a, b) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        })
    }

    pub fn not(&self) -> Self {
        Self {
            segments: self.segments.iter().map(|(i, v)| (*i, !v)).collect(),
        }
    }

    /// Keeps only what lies inside `bounds`.
    pub fn select(&self, bounds: Interval) -> Self {
        self.combine(&Self::of(bounds, true), |a, b| b.and(a))
    }

    /// Fills the gaps from `default`.
    pub fn assign_gaps(&self, default: &Windows) -> Self {
        self.combine(default, |a, b| a.or(b))
    }

    /// Turns true segments shorter than `min` or longer than `max` false.
    pub fn filter_by_duration(&self, min: Duration, max: Duration) -> Self {
        Self::from_raw(
            self.raw()
                .into_iter()
                .map(|(a, b, v)| {
                    let length = from_nanos(b - a);
                    (a, b, v && min <= length && length <= max)
                })
                .collect::<Vec<_>>(),
        )
    }

    /// Whether `self` is true everywhere `other` is true.
    pub fn includes(&self, other: &Windows) -> bool {
        other
            .combine(self, |o, s| (o == Some(true) && s != Some(true)).then_some(true))
            .segments
            .is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Interval, bool)> {
        self.segments.iter()
    }

    pub fn true_intervals(&self) -> impl Iterator<Item = Interval> + '_ {
        self.segments.iter().filter(|(_, v)| *v).map(|(i, _)| *i)
    }

    pub fn min_true_time_point(&self) -> Option<Duration> {
        self.true_intervals().next().map(|i| i.start)
    }

    pub fn max_true_time_point(&self) -> Option<Duration> {
        self.true_intervals().last().map(|i| i.end)
    }

    /// True nowhere. Gaps count as not true.
    pub fn is_all_false(&self) -> bool {
        self.true_intervals().next().is_none()
    }

    /// Undefined everywhere.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}
