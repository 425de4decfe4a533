//! Expressions that turn simulation results into [Windows].

use crate::activity::SchedulingActivityDirective;
use crate::error::EvaluationError;
use crate::time::{Interval, from_nanos};
use crate::windows::Windows;
use hifitime::Duration;
use kestrel::{ProfileSegment, RealDynamics, SerializedValue, SimulationResults};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Equal,
    NotEqual,
}

impl CompareOp {
    pub fn holds(&self, left: f64, right: f64) -> bool {
        match self {
            CompareOp::LessThan => left < right,
            CompareOp::LessThanOrEqual => left <= right,
            CompareOp::GreaterThan => left > right,
            CompareOp::GreaterThanOrEqual => left >= right,
            CompareOp::Equal => left == right,
            CompareOp::NotEqual => left != right,
        }
    }
}

/// Named things an expression can refer to while it is evaluated for one conflict.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvaluationEnvironment {
    pub activities: BTreeMap<String, SchedulingActivityDirective>,
    pub intervals: BTreeMap<String, Interval>,
}

impl EvaluationEnvironment {
    pub fn with_interval(mut self, alias: impl Into<String>, interval: Interval) -> Self {
        self.intervals.insert(alias.into(), interval);
        self
    }

    pub fn with_activity(
        mut self,
        alias: impl Into<String>,
        activity: SchedulingActivityDirective,
    ) -> Self {
        self.activities.insert(alias.into(), activity);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WindowsExpression {
    Value(bool),
    Literal(Windows),
    And(Vec<WindowsExpression>),
    Or(Vec<WindowsExpression>),
    Not(Box<WindowsExpression>),
    AssignGaps {
        expression: Box<WindowsExpression>,
        default: Box<WindowsExpression>,
    },
    RealCompare {
        resource: String,
        op: CompareOp,
        value: f64,
    },
    DiscreteEquals {
        resource: String,
        value: SerializedValue,
    },
    ShorterThan {
        expression: Box<WindowsExpression>,
        duration: Duration,
    },
    LongerThan {
        expression: Box<WindowsExpression>,
        duration: Duration,
    },
    /// True at the first instant of each true segment.
    Starts(Box<WindowsExpression>),
    /// True at the last instant of each true segment.
    Ends(Box<WindowsExpression>),
    /// True while any activity of this type is running.
    ActivityWindows(String),
    /// True while the activity bound to this alias runs.
    ActivityInstance(String),
    /// True over the interval bound to this alias.
    NamedInterval(String),
}

impl WindowsExpression {
    pub fn real(resource: impl Into<String>, op: CompareOp, value: f64) -> Self {
        WindowsExpression::RealCompare {
            resource: resource.into(),
            op,
            value,
        }
    }

    pub fn discrete_equals(resource: impl Into<String>, value: impl Into<SerializedValue>) -> Self {
        WindowsExpression::DiscreteEquals {
            resource: resource.into(),
            value: value.into(),
        }
    }

    pub fn and(self, other: WindowsExpression) -> Self {
        WindowsExpression::And(vec![self, other])
    }

    pub fn or(self, other: WindowsExpression) -> Self {
        WindowsExpression::Or(vec![self, other])
    }

    pub fn not(self) -> Self {
        WindowsExpression::Not(Box::new(self))
    }

    pub fn assign_gaps(self, default: WindowsExpression) -> Self {
        WindowsExpression::AssignGaps {
            expression: Box::new(self),
            default: Box::new(default),
        }
    }

    /// Evaluates the expression over `bounds`. Everything outside `bounds` is a gap.
    pub fn evaluate(
        &self,
        results: &SimulationResults,
        bounds: Interval,
        env: &EvaluationEnvironment,
    ) -> Result<Windows, EvaluationError> {
        Ok(self.evaluate_unbounded(results, bounds, env)?.select(bounds))
    }

    fn evaluate_unbounded(
        &self,
        results: &SimulationResults,
        bounds: Interval,
        env: &EvaluationEnvironment,
    ) -> Result<Windows, EvaluationError> {
        use WindowsExpression::*;
        Ok(match self {
            Value(value) => Windows::of(bounds, *value),
            Literal(windows) => windows.clone(),
            And(operands) => {
                let mut windows = Windows::of(bounds, true);
                for operand in operands {
                    windows = windows.and(&operand.evaluate(results, bounds, env)?);
                }
                windows
            }
            Or(operands) => {
                let mut windows = Windows::of(bounds, false);
                for operand in operands {
                    windows = windows.or(&operand.evaluate(results, bounds, env)?);
                }
                windows
            }
            Not(operand) => operand.evaluate(results, bounds, env)?.not(),
            AssignGaps {
                expression,
                default,
            } => expression
                .evaluate(results, bounds, env)?
                .assign_gaps(&default.evaluate(results, bounds, env)?),
            RealCompare {
                resource,
                op,
                value,
            } => {
                let profile = results.real_profiles.get(resource).ok_or_else(|| {
                    EvaluationError::UnknownResource {
                        name: resource.clone(),
                    }
                })?;
                real_compare(profile, *op, *value)
            }
            DiscreteEquals { resource, value } => {
                let profile = results.discrete_profiles.get(resource).ok_or_else(|| {
                    EvaluationError::UnknownResource {
                        name: resource.clone(),
                    }
                })?;
                let mut windows = Windows::new();
                for (interval, segment) in segment_intervals(profile) {
                    windows = windows.set(interval, segment.dynamics == *value);
                }
                windows
            }
            ShorterThan {
                expression,
                duration,
            } => expression
                .evaluate(results, bounds, env)?
                .filter_by_duration(Duration::ZERO, *duration - nanosecond()),
            LongerThan {
                expression,
                duration,
            } => expression
                .evaluate(results, bounds, env)?
                .filter_by_duration(*duration + nanosecond(), Duration::MAX),
            Starts(expression) => edges(&expression.evaluate(results, bounds, env)?, |i| i.start),
            Ends(expression) => edges(&expression.evaluate(results, bounds, env)?, |i| i.end),
            ActivityWindows(type_name) => Windows::from_true_intervals(
                bounds,
                results
                    .activities
                    .values()
                    .filter(|span| &span.type_name == type_name)
                    .map(|span| {
                        Interval::between(
                            span.start_offset,
                            span.end_offset().unwrap_or(results.duration),
                        )
                    }),
            ),
            ActivityInstance(alias) => {
                let activity =
                    env.activities
                        .get(alias)
                        .ok_or_else(|| EvaluationError::UnboundAlias {
                            alias: alias.clone(),
                        })?;
                Windows::from_true_intervals(bounds, [activity.interval()])
            }
            NamedInterval(alias) => {
                let interval =
                    env.intervals
                        .get(alias)
                        .ok_or_else(|| EvaluationError::UnboundAlias {
                            alias: alias.clone(),
                        })?;
                Windows::from_true_intervals(bounds, [*interval])
            }
        })
    }
}

fn nanosecond() -> Duration {
    from_nanos(1)
}

/// The instants each segment covers. The last segment includes the end of the profile.
fn segment_intervals<D>(
    profile: &[ProfileSegment<D>],
) -> impl Iterator<Item = (Interval, &ProfileSegment<D>)> {
    let mut start = Duration::ZERO;
    let count = profile.len();
    profile.iter().enumerate().map(move |(i, segment)| {
        let segment_start = start;
        start += segment.extent;
        let interval = if i + 1 == count {
            Interval::between(segment_start, start)
        } else {
            Interval::half_open(segment_start, start)
        };
        (interval, segment)
    })
}

fn edges(windows: &Windows, edge: impl Fn(&Interval) -> Duration) -> Windows {
    let mut result = Windows::from_segments(windows.iter().map(|(i, _)| (*i, false)));
    for interval in windows.true_intervals() {
        result = result.set(Interval::at(edge(&interval)), true);
    }
    result
}

/// Compares a piecewise linear profile against a constant.
///
/// Crossings are found by bisection over whole nanoseconds, evaluating the dynamics
/// the same way sampling does, so the windows agree with sampled values exactly.
fn real_compare(profile: &[ProfileSegment<RealDynamics>], op: CompareOp, value: f64) -> Windows {
    let mut windows = Windows::new();
    for (interval, segment) in segment_intervals(profile) {
        let Some((first, last)) = interval.closed() else {
            continue;
        };
        let dynamics = segment.dynamics;
        let at = |t: i128| dynamics.value_at(from_nanos(t - first));
        let range = |op: CompareOp| monotone_range(first, last, |t| op.holds(at(t), value));
        windows = match op {
            CompareOp::Equal | CompareOp::NotEqual => {
                let equal = intersect(
                    range(CompareOp::GreaterThanOrEqual),
                    range(CompareOp::LessThanOrEqual),
                );
                let equal_value = op == CompareOp::Equal;
                let windows = windows.set(interval, !equal_value);
                match equal {
                    Some((a, b)) => windows.set(Interval::from_closed(a, b), equal_value),
                    None => windows,
                }
            }
            _ => {
                let windows = windows.set(interval, false);
                match range(op) {
                    Some((a, b)) => windows.set(Interval::from_closed(a, b), true),
                    None => windows,
                }
            }
        };
    }
    windows
}

fn intersect(a: Option<(i128, i128)>, b: Option<(i128, i128)>) -> Option<(i128, i128)> {
    let ((a0, a1), (b0, b1)) = (a?, b?);
    let (first, last) = (a0.max(b0), a1.min(b1));
    (first <= last).then_some((first, last))
}

/// The range of `[first, last]` where a monotone predicate holds.
fn monotone_range(first: i128, last: i128, holds: impl Fn(i128) -> bool) -> Option<(i128, i128)> {
    let (at_first, at_last) = (holds(first), holds(last));
    match (at_first, at_last) {
        (true, true) => Some((first, last)),
        (false, false) => None,
        (false, true) => {
            let (mut lo, mut hi) = (first, last);
            while hi - lo > 1 {
                let mid = lo + (hi - lo) / 2;
                if holds(mid) {
                    hi = mid;
                } else {
                    lo = mid;
                }
            }
            Some((hi, last))
        }
        (true, false) => {
            let (mut lo, mut hi) = (first, last);
            while hi - lo > 1 {
                let mid = lo + (hi - lo) / 2;
                if holds(mid) {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            Some((first, lo))
        }
    }
}
