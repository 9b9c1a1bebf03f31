//! Generation-checked handle arena with typed attribute columns.
//!
//! DESIGN
//! ======
//! A [`HandleStore`] hands out opaque integer handles with manual reference
//! counting: a handle is readable iff its reference count is at least one,
//! and releasing the last reference returns the slot to a free list for
//! reuse. Each handle carries the slot's generation at allocation time, and
//! the generation bumps on free, so any read through a stale handle is
//! caught instead of silently observing the slot's next occupant.
//!
//! Attribute storage lives in separate [`Column`]s indexed by handle. Reads
//! go through the store and check two things: the handle must still be live
//! (a freed handle cannot read back the cell it wrote), and the cell's
//! stamped generation must match the handle's (a reused handle reads `None`
//! until its own generation writes the cell). Prior occupants' values never
//! leak across a reuse, and a released handle goes dark immediately.

/// Opaque reusable identifier for one slot in a [`HandleStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// Slot index. Used as the advisory `nodeId` on the wire; only
    /// meaningful to the process that allocated the handle.
    #[must_use]
    pub fn index(self) -> u32 {
        self.index
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// The handle refers to a slot that has since been freed (or was never
/// allocated by this store).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("stale handle {0}")]
pub struct StaleHandle(pub Handle);

#[derive(Debug)]
struct Slot {
    generation: u32,
    refs: u32,
}

/// Sparse container of reference-counted handles.
#[derive(Debug, Default)]
pub struct HandleStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl HandleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh handle with reference count zero. The caller must
    /// [`retain`](Self::retain) it before the handle counts as live.
    pub fn new_element(&mut self) -> Handle {
        if let Some(index) = self.free.pop() {
            let generation = self.slots[index as usize].generation;
            return Handle { index, generation };
        }

        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot { generation: 0, refs: 0 });
        Handle { index, generation: 0 }
    }

    /// Increment the handle's reference count.
    ///
    /// # Errors
    ///
    /// [`StaleHandle`] if the slot has been freed since allocation.
    pub fn retain(&mut self, handle: Handle) -> Result<(), StaleHandle> {
        let slot = self.slot_mut(handle)?;
        slot.refs += 1;
        Ok(())
    }

    /// Decrement the handle's reference count. Reaching zero frees the
    /// slot: its generation bumps and it becomes available for reuse by a
    /// later [`new_element`](Self::new_element). Releasing a never-retained
    /// handle frees it immediately (an abandoned allocation).
    ///
    /// # Errors
    ///
    /// [`StaleHandle`] if the slot has already been freed.
    pub fn release(&mut self, handle: Handle) -> Result<(), StaleHandle> {
        let slot = self.slot_mut(handle)?;
        slot.refs = slot.refs.saturating_sub(1);
        if slot.refs == 0 {
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(handle.index);
        }
        Ok(())
    }

    /// A handle is live iff its generation is current and its reference
    /// count is at least one.
    #[must_use]
    pub fn is_live(&self, handle: Handle) -> bool {
        self.slot(handle).is_some_and(|slot| slot.refs >= 1)
    }

    /// Lazy, restartable iteration over all live handles in slot order.
    /// Reused handles take the position of their prior occupant; callers
    /// rely on handle identity, never on ordering.
    pub fn live_handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            (slot.refs >= 1).then(|| Handle {
                index: u32::try_from(index).unwrap_or(u32::MAX),
                generation: slot.generation,
            })
        })
    }

    /// Number of live handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.refs >= 1).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total slots ever allocated, live or free.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, handle: Handle) -> Option<&Slot> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
    }

    fn slot_mut(&mut self, handle: Handle) -> Result<&mut Slot, StaleHandle> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(StaleHandle(handle))
    }
}

#[derive(Debug)]
struct Cell<T> {
    generation: u32,
    value: T,
}

/// One named attribute column, indexed by handle. Reads take the owning
/// [`HandleStore`] and return `None` unless the handle is live *and* its
/// generation matches the stamped cell.
#[derive(Debug)]
pub struct Column<T> {
    cells: Vec<Option<Cell<T>>>,
}

impl<T> Default for Column<T> {
    fn default() -> Self {
        Self { cells: Vec::new() }
    }
}

impl<T> Column<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the cell for `handle`, stamping it with the handle's
    /// generation.
    pub fn insert(&mut self, handle: Handle, value: T) {
        let index = handle.index as usize;
        if index >= self.cells.len() {
            self.cells.resize_with(index + 1, || None);
        }
        self.cells[index] = Some(Cell {
            generation: handle.generation,
            value,
        });
    }

    #[must_use]
    pub fn get(&self, store: &HandleStore, handle: Handle) -> Option<&T> {
        if !store.is_live(handle) {
            return None;
        }
        self.cells
            .get(handle.index as usize)?
            .as_ref()
            .filter(|cell| cell.generation == handle.generation)
            .map(|cell| &cell.value)
    }

    pub fn get_mut(&mut self, store: &HandleStore, handle: Handle) -> Option<&mut T> {
        if !store.is_live(handle) {
            return None;
        }
        self.cells
            .get_mut(handle.index as usize)?
            .as_mut()
            .filter(|cell| cell.generation == handle.generation)
            .map(|cell| &mut cell.value)
    }

    /// Clear the cell, returning the value if the handle is live and its
    /// generation matched. Owners clear their columns *before* releasing
    /// the handle.
    pub fn remove(&mut self, store: &HandleStore, handle: Handle) -> Option<T> {
        if !store.is_live(handle) {
            return None;
        }
        let slot = self.cells.get_mut(handle.index as usize)?;
        if slot
            .as_ref()
            .is_some_and(|cell| cell.generation == handle.generation)
        {
            return slot.take().map(|cell| cell.value);
        }
        None
    }
}

#[cfg(test)]
#[path = "handle_test.rs"]
mod tests;
