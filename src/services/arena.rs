//! Slot arena with stable ids and mark-and-compact removal
//!
//! Each pallet category owns one arena. Removing an entry leaves a hole, so
//! ids handed out before the removal stay valid for the rest of a scan; the
//! holes are dropped by `compact` once the cycle is done with the arena.

/// Stable handle into an [`Arena`], valid until the next `compact`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(usize);

#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: T) -> SlotId {
        self.slots.push(Some(value));
        SlotId(self.slots.len() - 1)
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Remove an entry, leaving a hole until `compact`
    pub fn take(&mut self, id: SlotId) -> Option<T> {
        self.slots.get_mut(id.0).and_then(Option::take)
    }

    /// Snapshot of the currently live ids, in insertion order
    pub fn slot_ids(&self) -> Vec<SlotId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| SlotId(i))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| slot.as_ref().map(|v| (SlotId(i), v)))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Drop holes. Invalidates every outstanding `SlotId`.
    pub fn compact(&mut self) {
        self.slots.retain(Option::is_some);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
