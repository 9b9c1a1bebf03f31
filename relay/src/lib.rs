//! # relay
//!
//! WebSocket relay for collaborative 3D scene sessions. Assigns participant
//! identities, replays the roster to joiners, stamps the authoritative
//! `senderId` on every frame, and rebroadcasts in arrival order. The relay
//! holds no scene state; clients reconcile from the frame stream.

pub mod state;
pub mod ws;

use axum::Router;
use axum::routing::get;

use crate::state::RelayState;

/// Build the relay router: a single websocket endpoint at `/`.
#[must_use]
pub fn app(state: RelayState) -> Router {
    Router::new()
        .route("/", get(ws::handle_ws))
        .with_state(state)
}
