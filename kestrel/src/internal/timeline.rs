use crate::internal::engine::TaskId;
use crate::public::cell::{EventValue, Topic, TopicId};
use crate::public::value::SerializedValue;
use hifitime::TimeScale::TAI;
use hifitime::{Duration, Epoch as Time};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

pub fn epoch_to_duration(time: Time) -> Duration {
    time.to_tai_duration()
}
pub const fn duration_to_epoch(duration: Duration) -> Time {
    Time {
        duration,
        time_scale: TAI,
    }
}

/// The causal structure of everything that happened in one instant.
///
/// Events in a `Sequentially` node happened in order, and the right side could observe
/// the left. Events in a `Concurrently` node have no order between them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum EventGraph<E> {
    #[default]
    Empty,
    Atom(E),
    Sequentially(Box<EventGraph<E>>, Box<EventGraph<E>>),
    Concurrently(Box<EventGraph<E>>, Box<EventGraph<E>>),
}

impl<E> EventGraph<E> {
    pub fn atom(event: E) -> Self {
        EventGraph::Atom(event)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, EventGraph::Empty)
    }

    pub fn sequentially(self, next: Self) -> Self {
        match (self, next) {
            (EventGraph::Empty, next) => next,
            (prefix, EventGraph::Empty) => prefix,
            (prefix, next) => EventGraph::Sequentially(Box::new(prefix), Box::new(next)),
        }
    }

    pub fn concurrently(self, other: Self) -> Self {
        match (self, other) {
            (EventGraph::Empty, other) => other,
            (left, EventGraph::Empty) => left,
            (left, right) => EventGraph::Concurrently(Box::new(left), Box::new(right)),
        }
    }

    /// Builds a chain of events that happened one after another.
    pub fn sequence(events: impl IntoIterator<Item = E>) -> Self {
        events
            .into_iter()
            .fold(EventGraph::Empty, |acc, e| acc.sequentially(EventGraph::Atom(e)))
    }

    pub fn concurrent(branches: impl IntoIterator<Item = EventGraph<E>>) -> Self {
        branches
            .into_iter()
            .fold(EventGraph::Empty, EventGraph::concurrently)
    }

    /// Collapses the graph bottom-up.
    pub fn fold<T>(
        &self,
        empty: &impl Fn() -> T,
        atom: &impl Fn(&E) -> T,
        sequentially: &impl Fn(T, T) -> T,
        concurrently: &impl Fn(T, T) -> T,
    ) -> T {
        match self {
            EventGraph::Empty => empty(),
            EventGraph::Atom(e) => atom(e),
            EventGraph::Sequentially(l, r) => sequentially(
                l.fold(empty, atom, sequentially, concurrently),
                r.fold(empty, atom, sequentially, concurrently),
            ),
            EventGraph::Concurrently(l, r) => concurrently(
                l.fold(empty, atom, sequentially, concurrently),
                r.fold(empty, atom, sequentially, concurrently),
            ),
        }
    }

    pub fn map<F>(&self, f: &impl Fn(&E) -> F) -> EventGraph<F> {
        match self {
            EventGraph::Empty => EventGraph::Empty,
            EventGraph::Atom(e) => EventGraph::Atom(f(e)),
            EventGraph::Sequentially(l, r) => {
                EventGraph::Sequentially(Box::new(l.map(f)), Box::new(r.map(f)))
            }
            EventGraph::Concurrently(l, r) => {
                EventGraph::Concurrently(Box::new(l.map(f)), Box::new(r.map(f)))
            }
        }
    }

    /// All events, left to right. Causal order is respected within a branch.
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        let mut stack = vec![self];
        let mut events = vec![];
        while let Some(node) = stack.pop() {
            match node {
                EventGraph::Empty => {}
                EventGraph::Atom(e) => events.push(e),
                EventGraph::Sequentially(l, r) | EventGraph::Concurrently(l, r) => {
                    stack.push(r);
                    stack.push(l);
                }
            }
        }
        events.into_iter()
    }
}

/// An event as the engine stores it: type-erased, tagged with topic and provenance.
#[derive(Clone)]
pub struct Event {
    pub topic: TopicId,
    pub provenance: TaskId,
    payload: Arc<dyn Any + Send + Sync>,
    serialize: fn(&dyn Any) -> SerializedValue,
}

fn serialize_payload<E: EventValue>(payload: &dyn Any) -> SerializedValue {
    payload
        .downcast_ref::<E>()
        .map(EventValue::to_serialized)
        .unwrap_or_default()
}

impl Event {
    pub fn new<E: EventValue>(topic: &Topic<E>, provenance: TaskId, value: E) -> Self {
        Self {
            topic: topic.id(),
            provenance,
            payload: Arc::new(value),
            serialize: serialize_payload::<E>,
        }
    }

    /// Returns the payload if this event was emitted on `topic`.
    pub fn extract<E: 'static>(&self, topic: &Topic<E>) -> Option<&E> {
        if self.topic == topic.id() {
            self.payload.downcast_ref()
        } else {
            None
        }
    }

    pub fn payload(&self) -> &dyn Any {
        &*self.payload
    }

    pub fn serialized(&self) -> SerializedValue {
        (self.serialize)(&*self.payload)
    }
}

impl Debug for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("topic", &self.topic)
            .field("provenance", &self.provenance)
            .field("value", &self.serialized())
            .finish()
    }
}

#[derive(Clone, Debug)]
pub enum TimelineEntry {
    Delta(Duration),
    Commit(EventGraph<Event>),
}

/// The append-only causal history of a simulation run.
#[derive(Clone, Debug, Default)]
pub struct TemporalEventSource {
    entries: Vec<TimelineEntry>,
    elapsed: Duration,
}

impl TemporalEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records time passing. Zero deltas are dropped.
    pub fn add_delta(&mut self, delta: Duration) {
        assert!(
            delta >= Duration::ZERO,
            "cannot append a negative delta ({delta}) to the timeline"
        );
        if delta > Duration::ZERO {
            self.elapsed += delta;
            self.entries.push(TimelineEntry::Delta(delta));
        }
    }

    pub fn add_commit(&mut self, commit: EventGraph<Event>) {
        self.entries.push(TimelineEntry::Commit(commit));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimelineEntry> {
        self.entries.iter()
    }

    /// Every commit, paired with the elapsed time it happened at.
    pub fn commits(&self) -> impl Iterator<Item = (Duration, &EventGraph<Event>)> {
        let mut elapsed = Duration::ZERO;
        self.entries.iter().filter_map(move |entry| match entry {
            TimelineEntry::Delta(delta) => {
                elapsed += *delta;
                None
            }
            TimelineEntry::Commit(graph) => Some((elapsed, graph)),
        })
    }

    /// The elapsed time at the start and after each entry.
    pub fn elapsed_points(&self) -> Vec<Duration> {
        let mut elapsed = Duration::ZERO;
        let mut points = Vec::with_capacity(self.entries.len() + 1);
        points.push(elapsed);
        for entry in &self.entries {
            if let TimelineEntry::Delta(delta) = entry {
                elapsed += *delta;
            }
            points.push(elapsed);
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hifitime::TimeUnits;

    #[test]
    fn graph_iteration_is_left_to_right() {
        let graph = EventGraph::sequence([1, 2])
            .concurrently(EventGraph::sequence([3]))
            .sequentially(EventGraph::atom(4));

        assert_eq!(vec![1, 2, 3, 4], graph.iter().copied().collect::<Vec<_>>());
    }

    #[test]
    fn empty_branches_collapse() {
        let graph: EventGraph<u8> = EventGraph::concurrent([EventGraph::Empty, EventGraph::Empty]);
        assert!(graph.is_empty());

        let graph = EventGraph::Empty.sequentially(EventGraph::atom(1));
        assert_eq!(EventGraph::Atom(1), graph);
    }

    #[test]
    fn fold_counts_events() {
        let graph = EventGraph::sequence([1, 2, 3]).concurrently(EventGraph::atom(4));
        let count = graph.fold(&|| 0, &|_| 1, &|a, b| a + b, &|a, b| a + b);
        assert_eq!(4, count);
    }

    #[test]
    fn elapsed_points_skip_zero_deltas() {
        let mut timeline = TemporalEventSource::new();
        timeline.add_commit(EventGraph::Empty);
        timeline.add_delta(Duration::ZERO);
        timeline.add_delta(2.seconds());
        timeline.add_commit(EventGraph::Empty);

        assert_eq!(3, timeline.len());
        assert_eq!(
            vec![Duration::ZERO, Duration::ZERO, 2.seconds(), 2.seconds()],
            timeline.elapsed_points()
        );
        assert_eq!(2.seconds(), timeline.elapsed());
    }

    #[test]
    #[should_panic]
    fn negative_deltas_are_rejected() {
        let mut timeline = TemporalEventSource::new();
        timeline.add_delta(-1.seconds());
    }
}
