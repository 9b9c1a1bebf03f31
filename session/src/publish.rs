//! Outbound edit coalescing.
//!
//! DESIGN
//! ======
//! Continuous local edits (camera orbit, drag, pointer strokes) arrive from
//! the input layer far faster than they are worth sending. [`EditPublisher`]
//! absorbs them as dirty flags and, once per client tick, [`poll`]s them
//! into at most one frame per edit stream. Discrete edits (select, markers,
//! primitives) never pass through here; the client sends those immediately.
//!
//! Flags survive across polls while the session is still unidentified, so
//! edits made before `SET_USER` arrives go out on the first tick after it.
//!
//! [`poll`]: EditPublisher::poll

use protocol::{
    CameraPayload, Command, NodeExtras, NodeTransform, PointerPayload, PointerRay,
    TransformsPayload,
};
use tracing::debug;

use crate::dispatch::Session;

/// Per-tick publisher for the three continuous edit streams.
#[derive(Debug, Default)]
pub struct EditPublisher {
    camera_dirty: bool,
    drag_dirty: bool,
    pointer_dirty: bool,
    pointer_last: PointerRay,
}

impl EditPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_camera(&mut self) {
        self.camera_dirty = true;
    }

    pub fn mark_drag(&mut self) {
        self.drag_dirty = true;
    }

    pub fn mark_pointer(&mut self, ray: PointerRay) {
        self.pointer_dirty = true;
        self.pointer_last = ray;
    }

    /// Drain the dirty flags into outbound commands, at most one per
    /// stream. Publishes nothing until the session has an identity.
    pub fn poll(&mut self, session: &Session) -> Vec<Command> {
        if session.local_id().is_none() {
            if self.camera_dirty || self.drag_dirty || self.pointer_dirty {
                debug!("holding dirty edits until identity is assigned");
            }
            return Vec::new();
        }

        let mut out = Vec::new();

        if self.camera_dirty {
            self.camera_dirty = false;
            out.push(Command::UpdateCamera(CameraPayload {
                view_matrix: session.local_camera(),
            }));
        }

        if self.drag_dirty {
            self.drag_dirty = false;
            if let Some(command) = drag_command(session) {
                out.push(command);
            }
        }

        if self.pointer_dirty {
            self.pointer_dirty = false;
            out.push(Command::UpdatePointer(PointerPayload {
                pointer: self.pointer_last,
            }));
        }

        out
    }
}

/// The current transform of whichever node the local participant is
/// dragging. `None` when the drag ended (or the node was deleted) between
/// the mark and the poll.
fn drag_command(session: &Session) -> Option<Command> {
    let handle = session.dragging()?;
    let name = session.entities.name(handle)?.to_owned();
    let matrix = session.entities.transform(&name)?;
    Some(Command::UpdateTransform(TransformsPayload {
        nodes: vec![NodeTransform {
            name,
            matrix,
            extras: NodeExtras {
                node_id: handle.index(),
            },
        }],
    }))
}

#[cfg(test)]
#[path = "publish_test.rs"]
mod tests;
