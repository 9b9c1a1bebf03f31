//! Collaborator seams toward rendering and presence visuals.
//!
//! The engine never touches a scene graph directly. Everything visual goes
//! through these two traits so the dependencies of each handler are
//! statically visible and tests can substitute recording doubles. Both
//! traits are synchronous: dispatch and publish are cooperative turns of
//! one control loop, and no collaborator call is allowed to block.

use protocol::{Marker, Mat4, PointerRay, Rgb};

use crate::handle::Handle;

/// Mutations of the rendered scene graph, keyed by the engine's runtime
/// handles.
pub trait SceneMutator {
    /// Apply a local transform to a node.
    fn set_node_transform(&mut self, node: Handle, matrix: &Mat4);

    /// Current local transform of a node, if it exists.
    fn node_transform(&self, node: Handle) -> Option<Mat4>;

    /// Current world transform of a node, if it exists.
    fn world_transform(&self, node: Handle) -> Option<Mat4>;

    /// Show or hide the selection highlight for a node.
    fn set_selection_visible(&mut self, node: Handle, visible: bool);

    /// Instantiate geometry for a dynamic primitive.
    fn spawn_primitive(&mut self, node: Handle, kind: &str, matrix: &Mat4);

    /// Remove a dynamic primitive's geometry.
    fn despawn_node(&mut self, node: Handle);
}

/// Visual presence of remote participants: camera frusta, pointer rays,
/// markers.
pub trait PresenceView {
    fn peer_joined(&mut self, user_id: u32, color: Rgb);

    /// Called after all of the peer's other visuals are released.
    fn peer_left(&mut self, user_id: u32);

    fn peer_camera_changed(&mut self, user_id: u32, matrix: &Mat4);

    fn pointer_visible(&mut self, user_id: u32, visible: bool);

    fn pointer_moved(&mut self, user_id: u32, ray: &PointerRay);

    fn marker_added(&mut self, user_id: u32, marker: &Marker);

    fn marker_removed(&mut self, user_id: u32, marker_id: i64);
}

/// Does nothing. For headless sessions and tests that only care about
/// registry state.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScene;

impl SceneMutator for NullScene {
    fn set_node_transform(&mut self, _node: Handle, _matrix: &Mat4) {}

    fn node_transform(&self, _node: Handle) -> Option<Mat4> {
        None
    }

    fn world_transform(&self, _node: Handle) -> Option<Mat4> {
        None
    }

    fn set_selection_visible(&mut self, _node: Handle, _visible: bool) {}

    fn spawn_primitive(&mut self, _node: Handle, _kind: &str, _matrix: &Mat4) {}

    fn despawn_node(&mut self, _node: Handle) {}
}

impl PresenceView for NullScene {
    fn peer_joined(&mut self, _user_id: u32, _color: Rgb) {}

    fn peer_left(&mut self, _user_id: u32) {}

    fn peer_camera_changed(&mut self, _user_id: u32, _matrix: &Mat4) {}

    fn pointer_visible(&mut self, _user_id: u32, _visible: bool) {}

    fn pointer_moved(&mut self, _user_id: u32, _ray: &PointerRay) {}

    fn marker_added(&mut self, _user_id: u32, _marker: &Marker) {}

    fn marker_removed(&mut self, _user_id: u32, _marker_id: i64) {}
}
