//! Entity registry — scene nodes, runtime ids, and exclusive selection.
//!
//! DESIGN
//! ======
//! Scene entities come from two places: static nodes registered at scene
//! load (never destroyed) and dynamic primitives created over the wire
//! (destroyed by `DELETE_PRIMITIVE` only). The stable key is the node
//! *name*; the runtime id is this registry's handle for it, and the two
//! directions always agree.
//!
//! Selection is exclusive: `selected_by` is nobody or exactly one
//! participant, and the only path between two owners leads through
//! `Unselected`. Arbitration is last-applied-wins over the relayed message
//! stream, so every client converges to the same owner.

use std::collections::HashMap;

use protocol::{Mat4, PrimitiveSpec};
use tracing::debug;

use crate::handle::{Column, Handle, HandleStore};

/// Who may clear another participant's selection.
///
/// The original protocol lets any peer deselect any node (arrival order
/// resolves the race); `OwnerOnly` tightens that for deployments that treat
/// cross-peer deselection as a defect rather than moderation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeselectPolicy {
    #[default]
    AnyPeer,
    OwnerOnly,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EntityError {
    #[error("unknown entity `{0}`")]
    Unknown(String),
    #[error("entity `{name}` is already selected by participant {owner}")]
    AlreadySelected { name: String, owner: u32 },
    #[error("`{0}` is a static scene node and cannot be deleted")]
    Static(String),
}

/// Outcome of [`EntityRegistry::add_primitive`].
#[derive(Debug, PartialEq, Eq)]
pub struct PrimitiveAdded {
    pub name: String,
    pub handle: Handle,
    /// False when the name already existed (a doubled `ADD_PRIMITIVE` is
    /// absorbed instead of creating a twin).
    pub created: bool,
}

/// Registry of scene entities keyed by stable name.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    store: HandleStore,
    names: Column<String>,
    transforms: Column<Mat4>,
    selected: Column<Option<u32>>,
    dynamic: Column<bool>,
    by_name: HashMap<String, Handle>,
    primitive_seq: HashMap<String, u32>,
    policy: DeselectPolicy,
}

impl EntityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_policy(policy: DeselectPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Register a static node from the loaded asset. Registering a name
    /// twice returns the existing handle unchanged.
    pub fn register_node(&mut self, name: &str, transform: Mat4) -> Handle {
        if let Some(&handle) = self.by_name.get(name) {
            return handle;
        }
        self.insert(name.to_owned(), transform, false)
    }

    /// Stable name -> runtime id.
    #[must_use]
    pub fn runtime_id(&self, name: &str) -> Option<Handle> {
        self.by_name.get(name).copied()
    }

    /// Runtime id -> stable name. Always agrees with
    /// [`runtime_id`](Self::runtime_id).
    #[must_use]
    pub fn name(&self, handle: Handle) -> Option<&str> {
        self.names.get(&self.store, handle).map(String::as_str)
    }

    pub fn set_transform(&mut self, name: &str, matrix: Mat4) -> bool {
        let Some(&handle) = self.by_name.get(name) else {
            return false;
        };
        self.transforms.insert(handle, matrix);
        true
    }

    #[must_use]
    pub fn transform(&self, name: &str) -> Option<Mat4> {
        let handle = self.runtime_id(name)?;
        self.transforms.get(&self.store, handle).copied()
    }

    #[must_use]
    pub fn selected_by(&self, name: &str) -> Option<u32> {
        let handle = self.runtime_id(name)?;
        self.selected.get(&self.store, handle).copied().flatten()
    }

    /// Claim exclusive selection of `name` for `participant`.
    ///
    /// Idempotent when the participant already owns the node.
    ///
    /// # Errors
    ///
    /// [`EntityError::AlreadySelected`] when a *different* participant owns
    /// it; [`EntityError::Unknown`] for unregistered names.
    pub fn select(&mut self, participant: u32, name: &str) -> Result<(), EntityError> {
        let handle = self
            .runtime_id(name)
            .ok_or_else(|| EntityError::Unknown(name.to_owned()))?;

        match self.selected.get(&self.store, handle).copied().flatten() {
            Some(owner) if owner != participant => Err(EntityError::AlreadySelected {
                name: name.to_owned(),
                owner,
            }),
            _ => {
                self.selected.insert(handle, Some(participant));
                Ok(())
            }
        }
    }

    /// Clear the selection of `name` on behalf of `requester`, subject to
    /// the registry's [`DeselectPolicy`]. Returns whether a selection was
    /// cleared; deselecting an unselected node is a no-op.
    pub fn deselect(&mut self, requester: u32, name: &str) -> bool {
        let Some(handle) = self.runtime_id(name) else {
            return false;
        };
        let Some(owner) = self.selected.get(&self.store, handle).copied().flatten() else {
            return false;
        };

        if self.policy == DeselectPolicy::OwnerOnly && owner != requester {
            debug!(name, owner, requester, "deselect refused by policy");
            return false;
        }

        self.selected.insert(handle, None);
        true
    }

    /// Unconditionally clear a selection, policy aside. Used when the
    /// entity itself is going away.
    pub(crate) fn clear_selection(&mut self, name: &str) -> bool {
        let Some(handle) = self.runtime_id(name) else {
            return false;
        };
        let had_owner = self.selected.get(&self.store, handle).copied().flatten().is_some();
        self.selected.insert(handle, None);
        had_owner
    }

    /// Create a dynamic entity from a primitive spec, generating a name of
    /// the form `"{kind}.{seq:03}"` when the spec carries none.
    pub fn add_primitive(&mut self, spec: &PrimitiveSpec) -> PrimitiveAdded {
        let name = match &spec.name {
            Some(name) => name.clone(),
            None => self.next_primitive_name(&spec.kind),
        };

        if let Some(&handle) = self.by_name.get(&name) {
            debug!(name, "primitive already exists, ignoring re-add");
            return PrimitiveAdded {
                name,
                handle,
                created: false,
            };
        }

        let transform = spec.matrix.unwrap_or(Mat4::IDENTITY);
        let handle = self.insert(name.clone(), transform, true);
        PrimitiveAdded {
            name,
            handle,
            created: true,
        }
    }

    /// Destroy a dynamic entity, returning its (now dead) handle so the
    /// caller can despawn the collaborator's node. Static nodes are never
    /// destroyed.
    ///
    /// # Errors
    ///
    /// [`EntityError::Unknown`] or [`EntityError::Static`].
    pub fn delete_primitive(&mut self, name: &str) -> Result<Handle, EntityError> {
        let Some(&handle) = self.by_name.get(name) else {
            return Err(EntityError::Unknown(name.to_owned()));
        };
        if !self.dynamic.get(&self.store, handle).copied().unwrap_or(false) {
            return Err(EntityError::Static(name.to_owned()));
        }

        self.by_name.remove(name);
        self.names.remove(&self.store, handle);
        let _ = self.store.release(handle);
        Ok(handle)
    }

    /// Entity names in slot order; used to populate selection lists.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.store
            .live_handles()
            .filter_map(|handle| self.name(handle))
    }

    #[must_use]
    pub fn is_dynamic(&self, name: &str) -> bool {
        self.runtime_id(name)
            .and_then(|handle| self.dynamic.get(&self.store, handle).copied())
            .unwrap_or(false)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    fn insert(&mut self, name: String, transform: Mat4, dynamic: bool) -> Handle {
        let handle = self.store.new_element();
        // Fresh handles always carry the current generation.
        let _ = self.store.retain(handle);

        self.names.insert(handle, name.clone());
        self.transforms.insert(handle, transform);
        self.selected.insert(handle, None);
        self.dynamic.insert(handle, dynamic);
        self.by_name.insert(name, handle);
        handle
    }

    fn next_primitive_name(&mut self, kind: &str) -> String {
        loop {
            let seq = self
                .primitive_seq
                .entry(kind.to_owned())
                .and_modify(|seq| *seq += 1)
                .or_insert(1);
            let name = format!("{kind}.{seq:03}");
            if !self.by_name.contains_key(&name) {
                return name;
            }
        }
    }
}

#[cfg(test)]
#[path = "entities_test.rs"]
mod tests;
