//! Command dispatcher — one inbound message in, registry mutations out.
//!
//! DESIGN
//! ======
//! [`Session`] is an explicit state object (no ambient globals) holding the
//! peer and entity registries plus the local participant's identity and
//! drag target. [`Session::apply`] routes a decoded message through one
//! exhaustive match over the vocabulary; every handler runs to completion
//! before the next message is dispatched, which is what makes arbitration
//! race-free on this process despite multiple remote senders.
//!
//! Handlers never send frames. They mutate the registries, call the
//! collaborator traits, and *return* whatever outbound commands they
//! produced; the session client owns the transport (same split as the
//! relay's outcome-based dispatch).
//!
//! ERROR HANDLING
//! ==============
//! Everything recoverable is absorbed here: unknown commands and stale
//! references to removed peers/markers/entities are logged and ignored,
//! never surfaced. Arbitration rejections leave state untouched and send
//! no denial — the losing client simply never sees its selection echoed.

use protocol::{
    CameraPayload, Command, Marker, MarkerPayload, MarkerRefPayload, Mat4, Message, NodeRef,
    NodeTransform, NodesPayload, PointerPayload, PointerRay, PrimitivePayload, PrimitiveRefPayload,
    TransformsPayload, UserIdPayload, UserPayload,
};
use tracing::{debug, info, warn};

use crate::entities::{DeselectPolicy, EntityError, EntityRegistry};
use crate::handle::Handle;
use crate::peers::PeerRegistry;
use crate::scene::{PresenceView, SceneMutator};

/// One client's view of the collaborative session.
#[derive(Debug, Default)]
pub struct Session {
    pub peers: PeerRegistry,
    pub entities: EntityRegistry,
    local_id: Option<u32>,
    local_camera: Mat4,
    dragging: Option<Handle>,
    next_marker_id: i64,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_policy(policy: DeselectPolicy) -> Self {
        Self {
            entities: EntityRegistry::with_policy(policy),
            ..Self::default()
        }
    }

    /// The relay-assigned local identity; `None` until `SET_USER` arrives.
    #[must_use]
    pub fn local_id(&self) -> Option<u32> {
        self.local_id
    }

    #[must_use]
    pub fn is_local(&self, user_id: u32) -> bool {
        self.local_id == Some(user_id)
    }

    /// The node the local participant currently holds for transform
    /// editing, if any.
    #[must_use]
    pub fn dragging(&self) -> Option<Handle> {
        self.dragging
    }

    #[must_use]
    pub fn local_camera(&self) -> Mat4 {
        self.local_camera
    }

    pub fn set_local_camera(&mut self, matrix: Mat4) {
        self.local_camera = matrix;
        if let Some(id) = self.local_id {
            self.peers.set_camera(id, matrix);
        }
    }

    /// Seed the entity registry from the asset-loading collaborator.
    pub fn register_scene_nodes<I>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = (String, Mat4)>,
    {
        for (name, transform) in nodes {
            self.entities.register_node(&name, transform);
        }
    }

    /// Allocate an id for a locally created marker. Marker ids are only
    /// unique per owner, so a plain counter suffices.
    pub fn next_marker_id(&mut self) -> i64 {
        self.next_marker_id += 1;
        self.next_marker_id
    }

    /// Dispatch one inbound message. Returns the outbound commands the
    /// handler produced (for the session client to encode and send).
    pub fn apply(
        &mut self,
        message: &Message,
        scene: &mut dyn SceneMutator,
        view: &mut dyn PresenceView,
    ) -> Vec<Command> {
        let sender = message.sender_id;
        match &message.command {
            Command::SetUser(payload) => self.on_set_user(payload, view),
            Command::NewUser(payload) => {
                self.on_new_user(payload, view);
                Vec::new()
            }
            Command::RemoveUser(payload) => {
                self.on_remove_user(payload, view);
                Vec::new()
            }
            Command::Select(payload) => {
                self.on_select(sender, payload, scene);
                Vec::new()
            }
            Command::Deselect(payload) => {
                self.on_deselect(sender, payload, scene);
                Vec::new()
            }
            Command::UpdateTransform(payload) => {
                self.on_update_transform(payload, scene);
                Vec::new()
            }
            Command::UpdateCamera(payload) => {
                self.on_update_camera(sender, payload, view);
                Vec::new()
            }
            Command::StartPointer => {
                self.on_pointer_active(sender, true, view);
                Vec::new()
            }
            Command::UpdatePointer(payload) => {
                self.on_update_pointer(sender, payload, view);
                Vec::new()
            }
            Command::EndPointer => {
                self.on_pointer_active(sender, false, view);
                Vec::new()
            }
            Command::AddMarker(payload) => {
                self.on_add_marker(sender, payload, view);
                Vec::new()
            }
            Command::DeleteMarker(payload) => {
                self.on_delete_marker(sender, payload, view);
                Vec::new()
            }
            Command::AddPrimitive(payload) => {
                self.on_add_primitive(payload, scene);
                Vec::new()
            }
            Command::DeletePrimitive(payload) => {
                self.on_delete_primitive(payload, scene);
                Vec::new()
            }
            Command::Unknown { command, payload } => {
                warn!(sender, command, %payload, "ignoring unknown command");
                Vec::new()
            }
        }
    }

    // =========================================================================
    // PEER LIFECYCLE
    // =========================================================================

    fn on_set_user(&mut self, payload: &UserPayload, _view: &mut dyn PresenceView) -> Vec<Command> {
        info!(user_id = payload.user_id, "local identity assigned");
        self.local_id = Some(payload.user_id);
        self.peers.add_user(payload.user_id, payload.color);
        self.peers.set_camera(payload.user_id, self.local_camera);

        // Announce our current camera pose to everyone already connected.
        vec![Command::UpdateCamera(CameraPayload {
            view_matrix: self.local_camera,
        })]
    }

    fn on_new_user(&mut self, payload: &UserPayload, view: &mut dyn PresenceView) {
        if self.peers.contains(payload.user_id) {
            debug!(user_id = payload.user_id, "duplicate NEW_USER ignored");
            return;
        }
        info!(user_id = payload.user_id, "peer joined");
        self.peers.add_user(payload.user_id, payload.color);
        view.peer_joined(payload.user_id, payload.color);
    }

    fn on_remove_user(&mut self, payload: &UserIdPayload, view: &mut dyn PresenceView) {
        let user_id = payload.user_id;
        if !self.peers.contains(user_id) {
            debug!(user_id, "REMOVE_USER for unknown peer ignored");
            return;
        }
        info!(user_id, "peer left");

        // Release external presence resources before the registry forgets
        // the peer: markers die with their owner, and a pointer mid-stroke
        // must not linger on screen.
        for marker_id in self.peers.marker_ids(user_id) {
            view.marker_removed(user_id, marker_id);
        }
        if self.peers.pointer(user_id).is_some_and(|p| p.active) {
            view.pointer_visible(user_id, false);
        }
        view.peer_left(user_id);

        self.peers.remove_user(user_id);
    }

    // =========================================================================
    // SELECTION AND TRANSFORMS
    // =========================================================================

    fn on_select(&mut self, sender: u32, payload: &NodesPayload, scene: &mut dyn SceneMutator) {
        for NodeRef { name, .. } in &payload.nodes {
            let Some(handle) = self.entities.runtime_id(name) else {
                debug!(sender, name, "SELECT for unknown entity ignored");
                continue;
            };

            match self.entities.select(sender, name) {
                Ok(()) => {
                    scene.set_selection_visible(handle, true);
                    if self.is_local(sender) {
                        // The transform-edit affordance attaches only when
                        // the relay confirmed *our* claim.
                        self.dragging = Some(handle);
                    }
                }
                Err(EntityError::AlreadySelected { owner, .. }) => {
                    debug!(sender, name, owner, "SELECT lost arbitration");
                }
                Err(err) => {
                    debug!(sender, name, %err, "SELECT ignored");
                }
            }
        }
    }

    fn on_deselect(&mut self, sender: u32, payload: &NodesPayload, scene: &mut dyn SceneMutator) {
        for NodeRef { name, .. } in &payload.nodes {
            let Some(handle) = self.entities.runtime_id(name) else {
                debug!(sender, name, "DESELECT for unknown entity ignored");
                continue;
            };

            if self.entities.deselect(sender, name) {
                scene.set_selection_visible(handle, false);
                if self.dragging == Some(handle) {
                    self.dragging = None;
                }
            }
        }
    }

    fn on_update_transform(&mut self, payload: &TransformsPayload, scene: &mut dyn SceneMutator) {
        for NodeTransform { name, matrix, .. } in &payload.nodes {
            let Some(handle) = self.entities.runtime_id(name) else {
                // Expected after a DELETE_PRIMITIVE raced an in-flight drag.
                debug!(name, "UPDATE_TRANSFORM for unknown entity ignored");
                continue;
            };
            self.entities.set_transform(name, *matrix);
            scene.set_node_transform(handle, matrix);
        }
    }

    // =========================================================================
    // PRESENCE
    // =========================================================================

    fn on_update_camera(&mut self, sender: u32, payload: &CameraPayload, view: &mut dyn PresenceView) {
        if !self.peers.set_camera(sender, payload.view_matrix) {
            debug!(sender, "UPDATE_CAMERA for unknown peer ignored");
            return;
        }
        if !self.is_local(sender) {
            view.peer_camera_changed(sender, &payload.view_matrix);
        }
    }

    fn on_pointer_active(&mut self, sender: u32, active: bool, view: &mut dyn PresenceView) {
        if self.peers.set_pointer_active(sender, active) {
            view.pointer_visible(sender, active);
        } else {
            debug!(sender, active, "pointer toggle for unknown peer ignored");
        }
    }

    fn on_update_pointer(&mut self, sender: u32, payload: &PointerPayload, view: &mut dyn PresenceView) {
        if self.peers.update_pointer(sender, payload.pointer) {
            view.pointer_moved(sender, &payload.pointer);
        } else {
            debug!(sender, "UPDATE_POINTER for unknown peer ignored");
        }
    }

    fn on_add_marker(&mut self, sender: u32, payload: &MarkerPayload, view: &mut dyn PresenceView) {
        if self.peers.add_marker(sender, payload.marker) {
            view.marker_added(sender, &payload.marker);
        } else {
            debug!(sender, "ADD_MARKER for unknown peer ignored");
        }
    }

    fn on_delete_marker(
        &mut self,
        sender: u32,
        payload: &MarkerRefPayload,
        view: &mut dyn PresenceView,
    ) {
        if self.peers.delete_marker(sender, payload.marker.id) {
            view.marker_removed(sender, payload.marker.id);
        } else {
            debug!(
                sender,
                marker_id = payload.marker.id,
                "DELETE_MARKER for unknown peer or marker ignored"
            );
        }
    }

    // =========================================================================
    // PRIMITIVES
    // =========================================================================

    fn on_add_primitive(&mut self, payload: &PrimitivePayload, scene: &mut dyn SceneMutator) {
        let spec = &payload.primitive;
        let added = self.entities.add_primitive(spec);
        if added.created {
            info!(name = added.name, kind = spec.kind, "primitive created");
            let matrix = spec.matrix.unwrap_or(Mat4::IDENTITY);
            scene.spawn_primitive(added.handle, &spec.kind, &matrix);
        }
    }

    fn on_delete_primitive(&mut self, payload: &PrimitiveRefPayload, scene: &mut dyn SceneMutator) {
        let name = &payload.primitive_id;

        // Policy says a DESELECT precedes deletion; enforce locally anyway
        // so a missing one cannot strand a selection on a dead entity.
        // Only for entities the delete can actually take: a refused delete
        // must leave a static node's selection untouched.
        if self.entities.is_dynamic(name) && self.entities.clear_selection(name) {
            if let Some(handle) = self.entities.runtime_id(name) {
                scene.set_selection_visible(handle, false);
            }
        }

        match self.entities.delete_primitive(name) {
            Ok(handle) => {
                info!(name, "primitive deleted");
                scene.despawn_node(handle);
                if self.dragging == Some(handle) {
                    self.dragging = None;
                }
            }
            Err(err) => {
                debug!(name, %err, "DELETE_PRIMITIVE ignored");
            }
        }
    }
}

// The publisher needs to observe a local drag without going through the
// wire; intents use these hooks from the client loop.
impl Session {
    /// Apply a locally originated drag to the registry and scene. Returns
    /// false (and changes nothing) unless the local participant currently
    /// holds the node.
    pub fn apply_local_drag(
        &mut self,
        name: &str,
        matrix: Mat4,
        scene: &mut dyn SceneMutator,
    ) -> bool {
        let Some(handle) = self.entities.runtime_id(name) else {
            return false;
        };
        if self.dragging != Some(handle) {
            debug!(name, "local drag for a node we do not hold, ignoring");
            return false;
        }
        self.entities.set_transform(name, matrix);
        scene.set_node_transform(handle, &matrix);
        true
    }

    /// Locally record a marker owned by the local participant. Used by the
    /// marker intent before the frame goes out (the relay does not echo
    /// `ADD_MARKER` back to its sender).
    pub fn apply_local_marker(&mut self, marker: Marker, view: &mut dyn PresenceView) -> bool {
        let Some(id) = self.local_id else {
            return false;
        };
        if self.peers.add_marker(id, marker) {
            view.marker_added(id, &marker);
            true
        } else {
            false
        }
    }

    /// Locally remove one of the local participant's markers.
    pub fn remove_local_marker(&mut self, marker_id: i64, view: &mut dyn PresenceView) -> bool {
        let Some(id) = self.local_id else {
            return false;
        };
        if self.peers.delete_marker(id, marker_id) {
            view.marker_removed(id, marker_id);
            true
        } else {
            false
        }
    }

    /// Locally track the pointer ray for publishing.
    pub fn set_local_pointer(&mut self, ray: PointerRay) {
        if let Some(id) = self.local_id {
            self.peers.update_pointer(id, ray);
        }
    }
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
