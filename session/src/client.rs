//! Session client: transport, tick loop, and intent plumbing.
//!
//! ARCHITECTURE
//! ============
//! [`SessionClient::run`] owns the websocket and drives three inputs through
//! one `select!` loop:
//!
//!   - inbound frames  -> decode -> [`Session::apply`] -> send returned frames
//!   - local intents   -> discrete ones go out immediately, continuous ones
//!                        only mark the [`EditPublisher`]
//!   - the tick        -> [`EditPublisher::poll`] -> send coalesced frames
//!
//! The loop is the only place frames are encoded or sent, so every outbound
//! frame carries the relay-assigned identity. Undecodable inbound frames are
//! logged and skipped; a closed socket ends the loop cleanly.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use protocol::{
    Command, MarkerPayload, MarkerRef, MarkerRefPayload, Mat4, Message, NodeExtras, NodeRef,
    NodesPayload, PointerRay, PrimitivePayload, PrimitiveRefPayload, PrimitiveSpec, Rgb, Vec3,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};
use tracing::{debug, info, warn};

use crate::dispatch::Session;
use crate::entities::DeselectPolicy;
use crate::publish::EditPublisher;
use crate::scene::{PresenceView, SceneMutator};

/// Error type for session client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The websocket handshake failed.
    #[error("websocket connect failed: {0}")]
    Connect(Box<tungstenite::Error>),
    /// The established connection failed mid-session.
    #[error("websocket transport failed: {0}")]
    Transport(Box<tungstenite::Error>),
    /// An outbound command could not be encoded.
    #[error(transparent)]
    Codec(#[from] protocol::CodecError),
}

/// Where and how to join a session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Relay websocket endpoint, e.g. `"ws://127.0.0.1:8080"`.
    pub endpoint: String,
    /// Publish interval for continuous edits.
    pub tick: Duration,
    pub deselect_policy: DeselectPolicy,
}

impl SessionConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            tick: Duration::from_millis(50),
            deselect_policy: DeselectPolicy::default(),
        }
    }
}

/// A locally originated edit, produced by the input layer.
#[derive(Clone, Debug)]
pub enum Intent {
    /// Seed the entity registry once assets finish loading.
    LoadScene(Vec<(String, Mat4)>),
    Select(String),
    Deselect(String),
    /// The local camera moved; coalesced per tick.
    CameraMoved(Mat4),
    /// A held node was dragged; applied locally, coalesced per tick.
    DragTransform(String, Mat4),
    PointerStarted,
    /// The pointer ray moved; coalesced per tick.
    PointerMoved(PointerRay),
    PointerEnded,
    AddMarker { origin: Vec3, end: Vec3, color: Rgb },
    DeleteMarker(i64),
    AddPrimitive(PrimitiveSpec),
    DeletePrimitive(String),
    /// Leave the session and end the client loop.
    Shutdown,
}

/// Lifecycle notifications for the embedding application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The relay assigned us this participant id.
    Identified(u32),
    /// The connection ended (relay shutdown or [`Intent::Shutdown`]).
    Closed,
}

/// Cheap cloneable handle for feeding intents into a running client.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    intents: mpsc::UnboundedSender<Intent>,
}

impl SessionHandle {
    /// Queue an intent. Returns false once the client loop has ended.
    pub fn send(&self, intent: Intent) -> bool {
        self.intents.send(intent).is_ok()
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One connected participant. Owns the socket and the session state; drive
/// it with [`run`](Self::run).
pub struct SessionClient {
    session: Session,
    publisher: EditPublisher,
    stream: WsStream,
    tick: Duration,
    intents: mpsc::UnboundedReceiver<Intent>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    scene: Box<dyn SceneMutator + Send>,
    view: Box<dyn PresenceView + Send>,
}

impl SessionClient {
    /// Connect to the relay. Returns the client (to be `run`), an intent
    /// handle for the input layer, and a lifecycle event receiver.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connect`] when the handshake fails.
    pub async fn connect(
        config: SessionConfig,
        scene: Box<dyn SceneMutator + Send>,
        view: Box<dyn PresenceView + Send>,
    ) -> Result<
        (
            Self,
            SessionHandle,
            mpsc::UnboundedReceiver<ConnectionEvent>,
        ),
        ClientError,
    > {
        let (stream, _) = connect_async(&config.endpoint)
            .await
            .map_err(|e| ClientError::Connect(Box::new(e)))?;
        info!(endpoint = config.endpoint, "connected to relay");

        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let client = Self {
            session: Session::with_policy(config.deselect_policy),
            publisher: EditPublisher::new(),
            stream,
            tick: config.tick,
            intents: intent_rx,
            events: event_tx,
            scene,
            view,
        };
        let handle = SessionHandle { intents: intent_tx };

        Ok((client, handle, event_rx))
    }

    /// Read access to the session state, for tests and embedders that poll.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Drive the session until the socket closes or a shutdown intent
    /// arrives. Returns the final session state.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] when a send fails; a clean close
    /// from either side is `Ok`.
    pub async fn run(mut self) -> Result<Session, ClientError> {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                inbound = self.stream.next() => {
                    match inbound {
                        Some(Ok(WsMessage::Text(text))) => {
                            self.on_frame(text.as_str()).await?;
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            info!("relay closed the connection");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(ClientError::Transport(Box::new(e)));
                        }
                    }
                }
                _ = ticker.tick() => {
                    for command in self.publisher.poll(&self.session) {
                        self.send(command).await?;
                    }
                }
                intent = self.intents.recv() => {
                    let Some(intent) = intent else {
                        // Every handle dropped; nothing can drive us any more.
                        break;
                    };
                    if !self.on_intent(intent).await? {
                        break;
                    }
                }
            }
        }

        let _ = self.events.send(ConnectionEvent::Closed);
        Ok(self.session)
    }

    /// Dispatch one inbound frame.
    async fn on_frame(&mut self, text: &str) -> Result<(), ClientError> {
        let message = match protocol::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(%e, "skipping undecodable frame");
                return Ok(());
            }
        };

        let was_identified = self.session.local_id().is_some();
        let outbound = self
            .session
            .apply(&message, self.scene.as_mut(), self.view.as_mut());

        if !was_identified {
            if let Some(id) = self.session.local_id() {
                let _ = self.events.send(ConnectionEvent::Identified(id));
            }
        }

        for command in outbound {
            self.send(command).await?;
        }
        Ok(())
    }

    /// Handle one local intent. Returns false to end the loop.
    async fn on_intent(&mut self, intent: Intent) -> Result<bool, ClientError> {
        match intent {
            Intent::Shutdown => {
                let _ = self.stream.close(None).await;
                return Ok(false);
            }
            Intent::LoadScene(nodes) => {
                self.session.register_scene_nodes(nodes);
            }
            Intent::Select(name) => {
                if let Some(command) = self.node_command(&name, Command::Select) {
                    // Applied on the relay echo, not here: arbitration
                    // happens in arrival order at each receiver.
                    self.send(command).await?;
                }
            }
            Intent::Deselect(name) => {
                if let Some(command) = self.node_command(&name, Command::Deselect) {
                    self.send(command).await?;
                }
            }
            Intent::CameraMoved(matrix) => {
                self.session.set_local_camera(matrix);
                self.publisher.mark_camera();
            }
            Intent::DragTransform(name, matrix) => {
                if self
                    .session
                    .apply_local_drag(&name, matrix, self.scene.as_mut())
                {
                    self.publisher.mark_drag();
                }
            }
            Intent::PointerStarted => {
                self.send(Command::StartPointer).await?;
            }
            Intent::PointerMoved(ray) => {
                self.session.set_local_pointer(ray);
                self.publisher.mark_pointer(ray);
            }
            Intent::PointerEnded => {
                self.send(Command::EndPointer).await?;
            }
            Intent::AddMarker { origin, end, color } => {
                let marker = protocol::Marker {
                    id: self.session.next_marker_id(),
                    origin,
                    end,
                    color,
                };
                if self.session.apply_local_marker(marker, self.view.as_mut()) {
                    self.send(Command::AddMarker(MarkerPayload { marker }))
                        .await?;
                }
            }
            Intent::DeleteMarker(id) => {
                if self.session.remove_local_marker(id, self.view.as_mut()) {
                    self.send(Command::DeleteMarker(MarkerRefPayload {
                        marker: MarkerRef { id },
                    }))
                    .await?;
                }
            }
            Intent::AddPrimitive(primitive) => {
                self.send(Command::AddPrimitive(PrimitivePayload { primitive }))
                    .await?;
            }
            Intent::DeletePrimitive(name) => {
                self.send(Command::DeletePrimitive(PrimitiveRefPayload {
                    primitive_id: name,
                }))
                .await?;
            }
        }
        Ok(true)
    }

    /// Build a SELECT/DESELECT payload for a named node, or `None` (logged)
    /// when the node is unknown.
    fn node_command(
        &self,
        name: &str,
        wrap: impl FnOnce(NodesPayload) -> Command,
    ) -> Option<Command> {
        let Some(handle) = self.session.entities.runtime_id(name) else {
            warn!(name, "intent names an unknown entity, dropping");
            return None;
        };
        Some(wrap(NodesPayload {
            nodes: vec![NodeRef {
                name: name.to_owned(),
                extras: NodeExtras {
                    node_id: handle.index(),
                },
            }],
        }))
    }

    async fn send(&mut self, command: Command) -> Result<(), ClientError> {
        let Some(sender_id) = self.session.local_id() else {
            debug!(tag = command.tag(), "dropping outbound frame before identity");
            return Ok(());
        };
        let text = protocol::encode(&Message::new(sender_id, command))?;
        self.stream
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| ClientError::Transport(Box::new(e)))
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
