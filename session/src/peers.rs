//! Peer registry — connected participants and their presence state.
//!
//! DESIGN
//! ======
//! Participants live in a [`HandleStore`] with one attribute column per
//! presence aspect (color, camera pose, pointer, markers) and a side map
//! from the relay-assigned user id to the handle, since the store itself is
//! handle-keyed. Every id-keyed operation resolves through the side map and
//! silently no-ops on unknown ids: an `UPDATE_*` racing a `REMOVE_USER` for
//! the same peer is expected and benign.

use std::collections::HashMap;

use protocol::{Marker, Mat4, PointerRay, Rgb};
use tracing::debug;

use crate::handle::{Column, Handle, HandleStore};

/// A participant's annotation-pointer state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointerState {
    pub active: bool,
    pub ray: PointerRay,
}

/// Registry of connected participants, local one included.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    store: HandleStore,
    user_ids: Column<u32>,
    colors: Column<Rgb>,
    cameras: Column<Mat4>,
    pointers: Column<PointerState>,
    markers: Column<HashMap<i64, Marker>>,
    by_id: HashMap<u32, Handle>,
}

impl PeerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant. Re-adding a known id is an idempotent no-op
    /// (a doubled `NEW_USER` must not reset presence state).
    pub fn add_user(&mut self, user_id: u32, color: Rgb) -> Handle {
        if let Some(&handle) = self.by_id.get(&user_id) {
            debug!(user_id, "peer already registered, ignoring re-add");
            return handle;
        }

        let handle = self.store.new_element();
        // A freshly allocated handle always has the current generation.
        let _ = self.store.retain(handle);

        self.user_ids.insert(handle, user_id);
        self.colors.insert(handle, color);
        self.cameras.insert(handle, Mat4::IDENTITY);
        self.pointers.insert(handle, PointerState::default());
        self.markers.insert(handle, HashMap::new());
        self.by_id.insert(user_id, handle);

        handle
    }

    /// Drop a participant and free their handle for reuse. The caller is
    /// responsible for releasing externally-owned presence resources (the
    /// rendering collaborator's helpers) *before* this call. No-op on
    /// unknown ids.
    pub fn remove_user(&mut self, user_id: u32) {
        let Some(handle) = self.by_id.remove(&user_id) else {
            debug!(user_id, "remove for unknown peer, ignoring");
            return;
        };

        // Dropping the marker map now; the other columns go dark with the
        // generation bump on release.
        self.markers.remove(&self.store, handle);
        let _ = self.store.release(handle);
    }

    #[must_use]
    pub fn contains(&self, user_id: u32) -> bool {
        self.by_id.contains_key(&user_id)
    }

    #[must_use]
    pub fn handle(&self, user_id: u32) -> Option<Handle> {
        self.by_id.get(&user_id).copied()
    }

    #[must_use]
    pub fn color(&self, user_id: u32) -> Option<Rgb> {
        self.column(user_id, &self.colors).copied()
    }

    /// Update a peer's camera pose. Returns whether the update applied.
    pub fn set_camera(&mut self, user_id: u32, matrix: Mat4) -> bool {
        let Some(&handle) = self.by_id.get(&user_id) else {
            return false;
        };
        self.cameras.insert(handle, matrix);
        true
    }

    #[must_use]
    pub fn camera(&self, user_id: u32) -> Option<Mat4> {
        self.column(user_id, &self.cameras).copied()
    }

    pub fn set_pointer_active(&mut self, user_id: u32, active: bool) -> bool {
        match self.pointer_mut(user_id) {
            Some(pointer) => {
                pointer.active = active;
                true
            }
            None => false,
        }
    }

    pub fn update_pointer(&mut self, user_id: u32, ray: PointerRay) -> bool {
        match self.pointer_mut(user_id) {
            Some(pointer) => {
                pointer.ray = ray;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn pointer(&self, user_id: u32) -> Option<PointerState> {
        self.column(user_id, &self.pointers).copied()
    }

    /// Attach a marker to its owning peer. Returns whether it applied.
    pub fn add_marker(&mut self, user_id: u32, marker: Marker) -> bool {
        match self.markers_mut(user_id) {
            Some(markers) => {
                markers.insert(marker.id, marker);
                true
            }
            None => false,
        }
    }

    /// Remove one marker. Returns false if the peer or the marker is
    /// unknown.
    pub fn delete_marker(&mut self, user_id: u32, marker_id: i64) -> bool {
        self.markers_mut(user_id)
            .is_some_and(|markers| markers.remove(&marker_id).is_some())
    }

    #[must_use]
    pub fn marker(&self, user_id: u32, marker_id: i64) -> Option<&Marker> {
        self.column(user_id, &self.markers)?.get(&marker_id)
    }

    /// Ids of all markers owned by a peer. Used when the peer is removed
    /// and its markers are implicitly destroyed.
    #[must_use]
    pub fn marker_ids(&self, user_id: u32) -> Vec<i64> {
        self.column(user_id, &self.markers)
            .map(|markers| markers.keys().copied().collect())
            .unwrap_or_default()
    }

    /// All registered user ids, in handle-slot order.
    pub fn user_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.store
            .live_handles()
            .filter_map(|handle| self.user_ids.get(&self.store, handle).copied())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn column<'a, T>(&'a self, user_id: u32, column: &'a Column<T>) -> Option<&'a T> {
        let handle = *self.by_id.get(&user_id)?;
        column.get(&self.store, handle)
    }

    fn pointer_mut(&mut self, user_id: u32) -> Option<&mut PointerState> {
        let handle = *self.by_id.get(&user_id)?;
        self.pointers.get_mut(&self.store, handle)
    }

    fn markers_mut(&mut self, user_id: u32) -> Option<&mut HashMap<i64, Marker>> {
        let handle = *self.by_id.get(&user_id)?;
        self.markers.get_mut(&self.store, handle)
    }
}

#[cfg(test)]
#[path = "peers_test.rs"]
mod tests;
