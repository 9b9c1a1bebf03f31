//! WebSocket handler — session frame relay.
//!
//! DESIGN
//! ======
//! The relay is deliberately thin: it assigns identities, replays the
//! roster, stamps `senderId` on every inbound frame, and rebroadcasts.
//! It never interprets scene content beyond the one naming duty it owns
//! (unnamed `ADD_PRIMITIVE` requests). Clients reconcile all state from
//! the frame stream in arrival order.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → assign id + color → send `SET_USER`
//! 2. Replay the roster as `NEW_USER` frames, announce the joiner to peers
//! 3. Inbound frames → restamp sender → rebroadcast (echo set includes
//!    the sender for frames whose effect must apply via the echo)
//! 4. Close → broadcast `REMOVE_USER` → roster cleanup

use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use protocol::{Command, Message, UserIdPayload, UserPayload};
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::RelayState;

/// Identity the relay uses when it originates a frame itself.
const RELAY_SENDER: u32 = 0;

pub async fn handle_ws(State(state): State<RelayState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: RelayState) {
    // Per-connection channel for frames rebroadcast by peers.
    let (client_tx, mut client_rx) = mpsc::channel::<String>(256);
    let joined = state.join(client_tx).await;
    let user_id = joined.user_id;

    info!(user_id, "client connected");

    // Identity first, then the roster replay, so the joiner knows every
    // peer before any of their edits arrive.
    let welcome = Message::new(
        RELAY_SENDER,
        Command::SetUser(UserPayload {
            user_id,
            color: joined.color,
        }),
    );
    if send_frame(&mut socket, &welcome).await.is_err() {
        state.leave(user_id).await;
        return;
    }
    for (peer_id, color) in joined.roster {
        let frame = Message::new(
            RELAY_SENDER,
            Command::NewUser(UserPayload {
                user_id: peer_id,
                color,
            }),
        );
        if send_frame(&mut socket, &frame).await.is_err() {
            state.leave(user_id).await;
            return;
        }
    }

    // Announce the joiner to everyone already here.
    broadcast_command(
        &state,
        Command::NewUser(UserPayload {
            user_id,
            color: joined.color,
        }),
        Some(user_id),
    )
    .await;

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                let Some(Ok(msg)) = inbound else { break };
                match msg {
                    WsMessage::Text(text) => {
                        relay_frame(&state, user_id, text.as_str()).await;
                    }
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if socket.send(WsMessage::Text(frame.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    // Cleanup first so the departure frame never loops back to a
    // half-closed socket.
    state.leave(user_id).await;
    broadcast_command(
        &state,
        Command::RemoveUser(UserIdPayload { user_id }),
        None,
    )
    .await;
    info!(user_id, "client disconnected");
}

// =============================================================================
// FRAME RELAY
// =============================================================================

/// Restamp, complete, and rebroadcast one inbound frame.
async fn relay_frame(state: &RelayState, user_id: u32, text: &str) {
    let mut message = match protocol::decode(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(user_id, error = %e, "dropping undecodable frame");
            return;
        }
    };

    // The relay is the authority on identity; whatever the client put in
    // `senderId` is overwritten.
    message.sender_id = user_id;

    // The one piece of content the relay owns: unnamed primitives get
    // their session-wide stable name here, so every client (the sender
    // included) learns it from the same frame.
    if let Command::AddPrimitive(payload) = &mut message.command {
        if payload.primitive.name.is_none() {
            let name = state.assign_primitive_name(&payload.primitive.kind).await;
            info!(user_id, name, "named primitive");
            payload.primitive.name = Some(name);
        }
    }

    debug!(user_id, tag = message.command.tag(), "relaying frame");

    let echo_to_sender = applies_via_echo(&message.command);
    let Some(text) = reencode(&message) else {
        warn!(user_id, tag = message.command.tag(), "failed to re-encode frame");
        return;
    };
    let except = if echo_to_sender { None } else { Some(user_id) };
    state.broadcast(&text, except).await;
}

/// Frames whose local effect the sender defers until its own copy comes
/// back, so every client applies them in the same relay order.
fn applies_via_echo(command: &Command) -> bool {
    matches!(
        command,
        Command::Select(_)
            | Command::Deselect(_)
            | Command::UpdateTransform(_)
            | Command::AddPrimitive(_)
            | Command::DeletePrimitive(_)
    )
}

/// Encode for rebroadcast. Unknown commands are forwarded rather than
/// dropped — older relays must not strand newer clients — which the codec
/// refuses to encode, so those are reassembled by hand.
fn reencode(message: &Message) -> Option<String> {
    match &message.command {
        Command::Unknown { command, payload } => {
            let mut object = match payload {
                Value::Object(map) => map.clone(),
                _ => Map::new(),
            };
            object.insert("senderId".into(), json!(message.sender_id));
            object.insert("command".into(), json!(command));
            serde_json::to_string(&Value::Object(object)).ok()
        }
        _ => protocol::encode(message).ok(),
    }
}

async fn broadcast_command(state: &RelayState, command: Command, except: Option<u32>) {
    match protocol::encode(&Message::new(RELAY_SENDER, command)) {
        Ok(text) => state.broadcast(&text, except).await,
        Err(e) => warn!(error = %e, "failed to encode relay frame"),
    }
}

async fn send_frame(socket: &mut WebSocket, message: &Message) -> Result<(), ()> {
    let text = protocol::encode(message).map_err(|e| {
        warn!(error = %e, "failed to encode frame");
    })?;
    socket
        .send(WsMessage::Text(text.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
