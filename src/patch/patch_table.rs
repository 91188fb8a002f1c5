use crate::stream::StreamError;
use std::collections::HashMap;

/// Callback that wires a decoded instance into whatever referenced it.
///
/// `C` is read-only context shared by every callback, such as the value
/// graph the instance lives in.
pub type Patcher<I, C> = Box<dyn FnOnce(&I, &C) -> Result<(), StreamError>>;

struct PatchEntry<I, C: ?Sized> {
    instance: Option<I>,
    pending: Vec<Patcher<I, C>>,
}

impl<I, C: ?Sized> PatchEntry<I, C> {
    fn new() -> Self {
        Self {
            instance: None,
            pending: Vec::new(),
        }
    }
}

/// Resolves references to instances that may be decoded before or after
/// the members that point at them.
///
/// A patcher registered for an id that is already resolved runs at once.
/// Otherwise it waits until [`resolve`](Self::resolve) supplies the
/// instance, at which point every waiting patcher runs in registration
/// order. Ids that were referenced but never resolved are reported by
/// [`ensure_resolved`](Self::ensure_resolved).
pub struct PatchTable<I, C: ?Sized> {
    entries: HashMap<i32, PatchEntry<I, C>>,
}

impl<I, C: ?Sized> Default for PatchTable<I, C> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<I, C: ?Sized> PatchTable<I, C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        id: i32,
        patcher: Patcher<I, C>,
        context: &C,
    ) -> Result<(), StreamError> {
        let entry = self.entries.entry(id).or_insert_with(PatchEntry::new);
        match &entry.instance {
            Some(instance) => patcher(instance, context),
            None => {
                entry.pending.push(patcher);
                Ok(())
            }
        }
    }

    /// Supplies the instance for `id` and drains its waiting patchers.
    ///
    /// Resolving the same id twice is a protocol violation.
    pub fn resolve(&mut self, id: i32, instance: I, context: &C) -> Result<(), StreamError> {
        let entry = self.entries.entry(id).or_insert_with(PatchEntry::new);
        if entry.instance.is_some() {
            return Err(StreamError::DuplicateInstance(id));
        }
        let pending = std::mem::take(&mut entry.pending);
        let instance = entry.instance.insert(instance);
        for patcher in pending {
            patcher(instance, context)?;
        }
        Ok(())
    }

    pub fn is_resolved(&self, id: i32) -> bool {
        self.instance(id).is_some()
    }

    pub fn instance(&self, id: i32) -> Option<&I> {
        self.entries.get(&id)?.instance.as_ref()
    }

    pub fn pending_count(&self, id: i32) -> usize {
        self.entries.get(&id).map_or(0, |entry| entry.pending.len())
    }

    /// Ids that were referenced but have not been resolved, in ascending
    /// order.
    pub fn unresolved(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.instance.is_none())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn ensure_resolved(&self) -> Result<(), StreamError> {
        match self.unresolved().first() {
            Some(id) => Err(StreamError::UnresolvedReference(*id)),
            None => Ok(()),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
