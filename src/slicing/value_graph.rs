use crate::slicing::Value;
use crate::stream::StreamError;

/// Handle to a class instance stored in a [`ValueGraph`].
///
/// Class members that refer to other instances hold `Option<ValueId>`
/// rather than owning pointers, which lets a graph contain cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Arena of class instances.
///
/// Decoding reserves a slot the first time an instance id is referenced and
/// fills it once the instance itself has been read; encoding walks the graph
/// starting from the ids the caller writes.
#[derive(Debug, Default)]
pub struct ValueGraph {
    slots: Vec<Option<Box<dyn Value>>>,
}

impl ValueGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<V: Value>(&mut self, value: V) -> ValueId {
        self.insert_boxed(Box::new(value))
    }

    pub fn insert_boxed(&mut self, value: Box<dyn Value>) -> ValueId {
        let id = self.next_id();
        self.slots.push(Some(value));
        id
    }

    /// Reserves an empty slot to be filled later.
    pub fn reserve(&mut self) -> ValueId {
        let id = self.next_id();
        self.slots.push(None);
        id
    }

    /// Fills a reserved slot. Filling a slot twice is an error.
    pub fn fill(&mut self, id: ValueId, value: Box<dyn Value>) -> Result<(), StreamError> {
        let slot = self
            .slots
            .get_mut(id.index())
            .ok_or(StreamError::MissingValue(id))?;
        if slot.is_some() {
            return Err(StreamError::Marshal(format!(
                "value slot {} is already filled",
                id.index()
            )));
        }
        *slot = Some(value);
        Ok(())
    }

    pub fn get(&self, id: ValueId) -> Option<&dyn Value> {
        self.slots.get(id.index())?.as_deref()
    }

    pub fn get_mut(&mut self, id: ValueId) -> Option<&mut (dyn Value + 'static)> {
        self.slots.get_mut(id.index())?.as_deref_mut()
    }

    pub fn downcast<T: Value>(&self, id: ValueId) -> Option<&T> {
        self.get(id)?.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Value>(&mut self, id: ValueId) -> Option<&mut T> {
        self.get_mut(id)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn contains(&self, id: ValueId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Reserved slots that were never filled.
    pub fn unfilled(&self) -> Vec<ValueId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(index, _)| ValueId(index as u32))
            .collect()
    }

    fn next_id(&self) -> ValueId {
        ValueId(self.slots.len() as u32)
    }
}
