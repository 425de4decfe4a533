use crate::public::results::RealDynamics;
use crate::public::value::SerializedValue;
use derive_more::Display;
use hifitime::Duration;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Any value that can be emitted on a [Topic].
///
/// Events have to be serializable so that they can be reported in the results.
pub trait EventValue: Clone + Send + Sync + 'static {
    fn to_serialized(&self) -> SerializedValue;
}

impl<T: Clone + Send + Sync + 'static + Into<SerializedValue>> EventValue for T {
    fn to_serialized(&self) -> SerializedValue {
        self.clone().into()
    }
}

/// The behavior of a cell: how events change its state, and how its state evolves
/// when time passes untouched.
pub trait CellType: Send + Sync + 'static {
    type State: Clone + Send + Sync + 'static;
    type Event: EventValue;

    fn apply(&self, state: &mut Self::State, event: &Self::Event);

    fn step(&self, _state: &mut Self::State, _elapsed: Duration) {}

    /// Whether events from different tasks in the same instant can be applied in any order.
    ///
    /// If this is false, the engine refuses to commit an instant where two tasks write the
    /// cell, or where one task reads what another writes.
    fn is_commutative(&self) -> bool {
        false
    }
}

/// A typed handle to a cell allocated by a mission model.
pub struct CellId<S> {
    pub(crate) index: usize,
    state: PhantomData<fn() -> S>,
}

impl<S> CellId<S> {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            state: PhantomData,
        }
    }
}

impl<S> Clone for CellId<S> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<S> Copy for CellId<S> {}

impl<S> PartialEq for CellId<S> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}
impl<S> Eq for CellId<S> {}

impl<S> Debug for CellId<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CellId({})", self.index)
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[display("topic {_0}")]
pub struct TopicId(pub u64);

static NEXT_TOPIC: AtomicU64 = AtomicU64::new(0);

/// A class of events that tasks can emit, and that cells can listen to.
pub struct Topic<E> {
    id: TopicId,
    name: Arc<str>,
    event: PhantomData<fn(E)>,
}

impl<E: EventValue> Topic<E> {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            id: TopicId(NEXT_TOPIC.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            event: PhantomData,
        }
    }
}

impl<E> Topic<E> {
    pub fn id(&self) -> TopicId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<E> Clone for Topic<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            event: PhantomData,
        }
    }
}

impl<E> Debug for Topic<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Topic({}, {:?})", self.id.0, self.name)
    }
}

/// A cell that holds whatever value was last written to it.
pub struct Register<T>(PhantomData<fn() -> T>);

impl<T> Default for Register<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: EventValue> CellType for Register<T> {
    type State = T;
    type Event = T;

    fn apply(&self, state: &mut T, event: &T) {
        *state = event.clone();
    }
}

/// A real-valued cell with linear dynamics. Events are added to the current value.
///
/// Addition commutes, so concurrent writers are allowed.
#[derive(Copy, Clone, Debug, Default)]
pub struct Accumulator;

impl CellType for Accumulator {
    type State = RealDynamics;
    type Event = f64;

    fn apply(&self, state: &mut RealDynamics, event: &f64) {
        state.initial += event;
    }

    fn step(&self, state: &mut RealDynamics, elapsed: Duration) {
        *state = state.evolved(elapsed);
    }

    fn is_commutative(&self) -> bool {
        true
    }
}

/// An integer cell. Events are added to the count.
#[derive(Copy, Clone, Debug, Default)]
pub struct Counter;

impl CellType for Counter {
    type State = i64;
    type Event = i64;

    fn apply(&self, state: &mut i64, event: &i64) {
        *state += event;
    }

    fn is_commutative(&self) -> bool {
        true
    }
}
