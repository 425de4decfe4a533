use crate::internal::timeline::{Event, EventGraph};
use crate::public::cell::{CellId, CellType, Topic, TopicId};
use ahash::AHashMap;
use hifitime::Duration;
use smallvec::SmallVec;
use std::any::Any;
use std::sync::Arc;

pub(crate) trait ErasedCell: Send + Sync {
    fn name(&self) -> &str;
    fn topic(&self) -> TopicId;
    fn apply(&mut self, event: &dyn Any);
    fn step(&mut self, elapsed: Duration);
    fn is_commutative(&self) -> bool;
    fn state(&self) -> &dyn Any;
    fn duplicate(&self) -> Box<dyn ErasedCell>;
}

struct TypedCell<C: CellType> {
    name: Arc<str>,
    cell_type: Arc<C>,
    topic: TopicId,
    state: C::State,
}

impl<C: CellType> ErasedCell for TypedCell<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn topic(&self) -> TopicId {
        self.topic
    }

    fn apply(&mut self, event: &dyn Any) {
        if let Some(event) = event.downcast_ref::<C::Event>() {
            self.cell_type.apply(&mut self.state, event);
        }
    }

    fn step(&mut self, elapsed: Duration) {
        self.cell_type.step(&mut self.state, elapsed);
    }

    fn is_commutative(&self) -> bool {
        self.cell_type.is_commutative()
    }

    fn state(&self) -> &dyn Any {
        &self.state
    }

    fn duplicate(&self) -> Box<dyn ErasedCell> {
        Box::new(TypedCell {
            name: self.name.clone(),
            cell_type: self.cell_type.clone(),
            topic: self.topic,
            state: self.state.clone(),
        })
    }
}

/// The cells a mission model starts every simulation with.
#[derive(Default)]
pub struct InitialCells {
    cells: Vec<Box<dyn ErasedCell>>,
}

impl InitialCells {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cell that listens to `topic`, and returns a handle to read it with.
    pub fn allocate<C: CellType>(
        &mut self,
        name: &str,
        cell_type: C,
        state: C::State,
        topic: &Topic<C::Event>,
    ) -> CellId<C::State> {
        let index = self.cells.len();
        self.cells.push(Box::new(TypedCell {
            name: name.into(),
            cell_type: Arc::new(cell_type),
            topic: topic.id(),
            state,
        }));
        CellId::new(index)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Clone for InitialCells {
    fn clone(&self) -> Self {
        Self {
            cells: self.cells.iter().map(|c| c.duplicate()).collect(),
        }
    }
}

/// The cells of one simulation run, folded up to the latest timeline entry.
pub struct LiveCells {
    cells: Vec<Box<dyn ErasedCell>>,
    listeners: AHashMap<TopicId, SmallVec<usize, 2>>,
    position: usize,
}

impl LiveCells {
    pub fn new(initial: &InitialCells) -> Self {
        let cells: Vec<_> = initial.cells.iter().map(|c| c.duplicate()).collect();
        let mut listeners: AHashMap<TopicId, SmallVec<usize, 2>> = AHashMap::new();
        for (index, cell) in cells.iter().enumerate() {
            listeners.entry(cell.topic()).or_default().push(index);
        }
        Self {
            cells,
            listeners,
            position: 0,
        }
    }

    /// The cell's value as of the current position.
    ///
    /// Panics if the id wasn't allocated by the model these cells came from.
    pub fn get<S: 'static>(&self, id: CellId<S>) -> &S {
        self.cells
            .get(id.index)
            .and_then(|c| c.state().downcast_ref::<S>())
            .unwrap_or_else(|| panic!("{id:?} is not registered in this simulation"))
    }

    /// Lets time pass for every cell.
    pub fn advance(&mut self, delta: Duration) {
        for cell in &mut self.cells {
            cell.step(delta);
        }
        self.position += 1;
    }

    /// Folds a committed instant into the cells.
    pub fn apply(&mut self, graph: &EventGraph<Event>) {
        for event in graph.iter() {
            if let Some(listeners) = self.listeners.get(&event.topic) {
                for &index in listeners {
                    self.cells[index].apply(event.payload());
                }
            }
        }
        self.position += 1;
    }

    /// How many timeline entries have been folded in.
    pub fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn listeners(&self, topic: TopicId) -> &[usize] {
        self.listeners.get(&topic).map(|l| l.as_slice()).unwrap_or(&[])
    }

    pub(crate) fn duplicate_cell(&self, index: usize) -> Box<dyn ErasedCell> {
        self.cells[index].duplicate()
    }

    pub(crate) fn cell_name(&self, index: usize) -> &str {
        self.cells[index].name()
    }

    pub(crate) fn is_commutative(&self, index: usize) -> bool {
        self.cells[index].is_commutative()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::engine::TaskId;
    use crate::public::cell::{Counter, Register};

    #[test]
    fn events_reach_listening_cells() {
        let topic = Topic::<i64>::new("count");
        let other = Topic::<String>::new("mode");
        let mut initial = InitialCells::new();
        let count = initial.allocate("count", Counter, 0, &topic);
        let mode = initial.allocate("mode", Register::<String>::default(), "idle".to_string(), &other);

        let mut cells = LiveCells::new(&initial);
        let graph = EventGraph::sequence([
            Event::new(&topic, TaskId::from_raw(0), 2),
            Event::new(&topic, TaskId::from_raw(0), 3),
        ]);
        cells.apply(&graph);

        assert_eq!(5, *cells.get(count));
        assert_eq!("idle", cells.get(mode));
        assert_eq!(1, cells.position());
    }

    #[test]
    fn live_cells_do_not_touch_the_template() {
        let topic = Topic::<i64>::new("count");
        let mut initial = InitialCells::new();
        let count = initial.allocate("count", Counter, 10, &topic);

        let mut cells = LiveCells::new(&initial);
        cells.apply(&EventGraph::atom(Event::new(&topic, TaskId::from_raw(0), 1)));

        assert_eq!(11, *cells.get(count));
        assert_eq!(10, *LiveCells::new(&initial).get(count));
    }

    #[test]
    #[should_panic]
    fn unknown_cells_are_fatal() {
        let cells = LiveCells::new(&InitialCells::new());
        cells.get(CellId::<i64>::new(3));
    }
}
