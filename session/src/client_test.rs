use super::*;
use protocol::UserPayload;
use tokio::net::TcpListener;
use tokio::time::timeout;

use crate::scene::NullScene;

// These tests play a miniature relay end of the socket with
// `tokio_tungstenite::accept_async` and script its side of the exchange.

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let endpoint = format!("ws://{}", listener.local_addr().expect("local addr"));
    (listener, endpoint)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (socket, _) = listener.accept().await.expect("accept");
    tokio_tungstenite::accept_async(socket)
        .await
        .expect("server handshake")
}

async fn send_frame(ws: &mut WebSocketStream<TcpStream>, sender_id: u32, command: Command) {
    let text = protocol::encode(&Message::new(sender_id, command)).expect("encode");
    ws.send(WsMessage::Text(text.into())).await.expect("relay send");
}

async fn recv_frame(ws: &mut WebSocketStream<TcpStream>) -> Message {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("frame receive timed out")
            .expect("socket closed unexpectedly")
            .expect("transport");
        if let WsMessage::Text(text) = msg {
            return protocol::decode(text.as_str()).expect("decode");
        }
    }
}

async fn recv_event(events: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event receive timed out")
        .expect("event channel closed unexpectedly")
}

/// A config whose tick never fires during a test, so only handshake and
/// intent-driven frames cross the wire.
fn quiet_config(endpoint: String) -> SessionConfig {
    let mut config = SessionConfig::new(endpoint);
    config.tick = Duration::from_secs(5);
    config
}

fn set_user(user_id: u32) -> Command {
    Command::SetUser(UserPayload {
        user_id,
        color: Rgb::WHITE,
    })
}

#[tokio::test]
async fn identity_handshake_announces_the_camera() {
    let (listener, endpoint) = listen().await;
    let relay = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        // Noise first: the client must skip what it cannot decode.
        ws.send(WsMessage::Text("not even json".into()))
            .await
            .expect("send noise");
        send_frame(&mut ws, 0, set_user(7)).await;
        let frame = recv_frame(&mut ws).await;
        ws.close(None).await.ok();
        frame
    });

    let (client, _handle, mut events) = SessionClient::connect(
        quiet_config(endpoint),
        Box::new(NullScene),
        Box::new(NullScene),
    )
    .await
    .expect("connect");
    let running = tokio::spawn(client.run());

    assert_eq!(recv_event(&mut events).await, ConnectionEvent::Identified(7));

    let frame = relay.await.expect("relay task");
    assert_eq!(frame.sender_id, 7);
    assert!(matches!(frame.command, Command::UpdateCamera(_)));

    assert_eq!(recv_event(&mut events).await, ConnectionEvent::Closed);
    let session = running.await.expect("client task").expect("clean run");
    assert_eq!(session.local_id(), Some(7));
}

#[tokio::test]
async fn select_goes_out_immediately_and_applies_on_the_echo() {
    let (listener, endpoint) = listen().await;
    let relay = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_frame(&mut ws, 0, set_user(7)).await;

        // Skip the handshake camera frame, then expect the selection.
        let select = loop {
            let frame = recv_frame(&mut ws).await;
            if let Command::Select(payload) = frame.command {
                break payload;
            }
        };
        assert_eq!(select.nodes.len(), 1);
        assert_eq!(select.nodes[0].name, "Cube.001");

        // Echo it back the way the relay does, then hang up.
        send_frame(&mut ws, 7, Command::Select(select)).await;
        ws.close(None).await.ok();
    });

    let (client, handle, mut events) = SessionClient::connect(
        quiet_config(endpoint),
        Box::new(NullScene),
        Box::new(NullScene),
    )
    .await
    .expect("connect");
    handle.send(Intent::LoadScene(vec![("Cube.001".to_owned(), Mat4::IDENTITY)]));
    let running = tokio::spawn(client.run());

    assert_eq!(recv_event(&mut events).await, ConnectionEvent::Identified(7));
    handle.send(Intent::Select("Cube.001".to_owned()));

    relay.await.expect("relay task");
    let session = running.await.expect("client task").expect("clean run");

    // Selection landed via the echo, with the drag affordance attached.
    assert_eq!(session.entities.selected_by("Cube.001"), Some(7));
    assert!(session.dragging().is_some());
}

#[tokio::test]
async fn marker_intents_apply_locally_and_notify_the_relay() {
    let (listener, endpoint) = listen().await;
    let relay = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_frame(&mut ws, 0, set_user(4)).await;

        let mut added = None;
        let mut deleted = None;
        while deleted.is_none() {
            match recv_frame(&mut ws).await.command {
                Command::AddMarker(payload) => added = Some(payload.marker),
                Command::DeleteMarker(payload) => deleted = Some(payload.marker.id),
                _ => {}
            }
        }
        (added.expect("ADD_MARKER before DELETE_MARKER"), deleted.expect("deleted"))
    });

    let (client, handle, mut events) = SessionClient::connect(
        quiet_config(endpoint),
        Box::new(NullScene),
        Box::new(NullScene),
    )
    .await
    .expect("connect");
    let running = tokio::spawn(client.run());

    assert_eq!(recv_event(&mut events).await, ConnectionEvent::Identified(4));
    handle.send(Intent::AddMarker {
        origin: Vec3::new(0.0, 1.0, 0.0),
        end: Vec3::ZERO,
        color: Rgb::WHITE,
    });
    handle.send(Intent::DeleteMarker(1));
    handle.send(Intent::Shutdown);

    let (added, deleted) = relay.await.expect("relay task");
    assert_eq!(added.id, 1);
    assert_eq!(deleted, 1);

    let session = running.await.expect("client task").expect("clean run");
    assert!(session.peers.marker(4, 1).is_none());
}

#[tokio::test]
async fn discrete_intents_before_identity_are_dropped() {
    let (listener, endpoint) = listen().await;
    let relay = tokio::spawn(async move {
        let mut ws = accept(&listener).await;

        // Give the pre-identity intent time to drain, then identify.
        tokio::time::sleep(Duration::from_millis(100)).await;
        send_frame(&mut ws, 0, set_user(2)).await;

        let frame = recv_frame(&mut ws).await;
        assert!(matches!(frame.command, Command::UpdateCamera(_)));

        // Nothing else should arrive: the pointer toggle predates identity.
        let extra = timeout(Duration::from_millis(150), ws.next()).await;
        assert!(extra.is_err(), "expected no frame, got {extra:?}");
        ws.close(None).await.ok();
    });

    let (client, handle, mut events) = SessionClient::connect(
        quiet_config(endpoint),
        Box::new(NullScene),
        Box::new(NullScene),
    )
    .await
    .expect("connect");
    handle.send(Intent::PointerStarted);
    let running = tokio::spawn(client.run());

    assert_eq!(recv_event(&mut events).await, ConnectionEvent::Identified(2));
    relay.await.expect("relay task");
    running.await.expect("client task").expect("clean run");
}
