//! Socket.IO transport against a local WebSocket server.
//!
//! The server side speaks just enough Engine.IO / Socket.IO to exercise
//! the client: open, namespace join, ping, acks, events and disconnects.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};

use verdant_core::socketio::{self, Frame, Handshake, Packet};
use verdant_core::{
    ChannelTransport, ConnectionStatus, Error, RealtimeChannel, ReconnectOptions,
    SocketIoTransport, TransportEvent,
};

const NAMESPACE: &str = "/cells";
const TOKEN: &str = "tok123";

type ServerSocket = WebSocketStream<TcpStream>;

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    (listener, url)
}

/// Accept one WebSocket, returning it with the `Authorization` header sent.
async fn accept(listener: &TcpListener) -> (ServerSocket, Option<String>) {
    let (stream, _) = listener.accept().await.unwrap();
    let auth = Arc::new(Mutex::new(None));
    let seen = Arc::clone(&auth);
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        *seen.lock().unwrap() = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(response)
    };
    let ws = accept_hdr_async(stream, callback).await.unwrap();
    let auth = auth.lock().unwrap().clone();
    (ws, auth)
}

async fn send(ws: &mut ServerSocket, frame: Frame) {
    ws.send(Message::text(socketio::encode(&frame))).await.unwrap();
}

async fn recv(ws: &mut ServerSocket) -> Option<Frame> {
    loop {
        match ws.next().await? {
            Ok(Message::Text(text)) => return Some(socketio::decode(text.as_str()).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// Send the open packet and confirm the namespace join.
async fn handshake(ws: &mut ServerSocket) {
    send(
        ws,
        Frame::Open(Handshake {
            sid: "sid-1".to_string(),
            upgrades: Vec::new(),
            ping_interval: 25_000,
            ping_timeout: 20_000,
            max_payload: None,
        }),
    )
    .await;
    match recv(ws).await {
        Some(Frame::Message(Packet::Connect { namespace, .. })) => assert_eq!(namespace, NAMESPACE),
        other => panic!("expected namespace connect, got {:?}", other),
    }
    send(
        ws,
        Frame::Message(Packet::Connect {
            namespace: NAMESPACE.to_string(),
            data: Some(json!({"sid": "ns-1"})),
        }),
    )
    .await;
}

/// Accept and join one client.
async fn accept_session(listener: &TcpListener) -> (ServerSocket, Option<String>) {
    let (mut ws, auth) = accept(listener).await;
    handshake(&mut ws).await;
    (ws, auth)
}

/// Acknowledge every event with `{"ok": true, "event": <name>}` until the
/// client leaves.
async fn serve_acks(mut ws: ServerSocket) {
    while let Some(frame) = recv(&mut ws).await {
        match frame {
            Frame::Message(Packet::Event {
                ack_id: Some(ack_id),
                name,
                ..
            }) => {
                send(
                    &mut ws,
                    Frame::Message(Packet::Ack {
                        namespace: NAMESPACE.to_string(),
                        ack_id,
                        args: vec![json!({"ok": true, "event": name})],
                    }),
                )
                .await;
            }
            Frame::Message(Packet::Disconnect { .. }) => break,
            _ => {}
        }
    }
}

fn transport(url: &str, reconnect: ReconnectOptions) -> SocketIoTransport {
    SocketIoTransport::new(url, NAMESPACE, reconnect).unwrap()
}

fn fast_reconnect() -> ReconnectOptions {
    ReconnectOptions::new()
        .initial_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(20))
        .jitter(0.0)
}

async fn next_event(events: &mut tokio::sync::mpsc::Receiver<TransportEvent>) -> Option<TransportEvent> {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a transport event")
}

// =============================================================================
// Connect and emit
// =============================================================================

#[tokio::test]
async fn test_bearer_header_and_namespace_join() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move { accept_session(&listener).await });

    let transport = transport(&url, ReconnectOptions::disabled());
    let mut events = transport.connect(Some(TOKEN.to_string())).await.unwrap();
    let (_ws, auth) = server.await.unwrap();

    assert_eq!(auth.as_deref(), Some("Bearer tok123"));
    assert!(transport.is_connected());
    assert_eq!(next_event(&mut events).await, Some(TransportEvent::Connected));
    transport.close().await.unwrap();
}

#[tokio::test]
async fn test_no_header_without_token() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move { accept_session(&listener).await });

    let transport = transport(&url, ReconnectOptions::disabled());
    transport.connect(None).await.unwrap();
    let (_ws, auth) = server.await.unwrap();
    assert!(auth.is_none());
    transport.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_emit_immediately_after_connect_is_acknowledged() {
    for round in 0..20 {
        let (listener, url) = listen().await;
        let server = tokio::spawn(async move {
            let (ws, _) = accept_session(&listener).await;
            serve_acks(ws).await;
        });

        let transport = transport(&url, ReconnectOptions::disabled());
        let _events = transport.connect(Some(TOKEN.to_string())).await.unwrap();
        let ack = transport
            .emit_with_ack(
                "subscribeToMetrics",
                json!({"cellId": "c1"}),
                Duration::from_secs(5),
            )
            .await
            .unwrap_or_else(|e| panic!("round {}: {}", round, e));
        assert_eq!(ack, json!({"ok": true, "event": "subscribeToMetrics"}));

        transport.close().await.unwrap();
        server.await.unwrap();
    }
}

#[tokio::test]
async fn test_acks_are_routed_by_id() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_session(&listener).await;
        let mut ids = Vec::new();
        while ids.len() < 2 {
            if let Some(Frame::Message(Packet::Event {
                ack_id: Some(id),
                name,
                ..
            })) = recv(&mut ws).await
            {
                ids.push((id, name));
            }
        }
        // answer in reverse order
        for (id, name) in ids.into_iter().rev() {
            send(
                &mut ws,
                Frame::Message(Packet::Ack {
                    namespace: NAMESPACE.to_string(),
                    ack_id: id,
                    args: vec![json!(name)],
                }),
            )
            .await;
        }
        serve_acks(ws).await;
    });

    let transport = Arc::new(transport(&url, ReconnectOptions::disabled()));
    let _events = transport.connect(Some(TOKEN.to_string())).await.unwrap();
    let (first, second) = tokio::join!(
        transport.emit_with_ack("first", json!({}), Duration::from_secs(5)),
        transport.emit_with_ack("second", json!({}), Duration::from_secs(5)),
    );
    assert_eq!(first.unwrap(), json!("first"));
    assert_eq!(second.unwrap(), json!("second"));

    transport.close().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_emit_after_close_fails() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let (ws, _) = accept_session(&listener).await;
        serve_acks(ws).await;
    });

    let transport = transport(&url, ReconnectOptions::disabled());
    transport.connect(None).await.unwrap();
    transport.close().await.unwrap();
    assert!(!transport.is_connected());

    let err = transport
        .emit_with_ack("subscribeToMetrics", json!({}), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ChannelClosed));
    server.await.unwrap();
}

// =============================================================================
// Server traffic
// =============================================================================

#[tokio::test]
async fn test_ping_is_answered_and_events_delivered() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_session(&listener).await;
        send(&mut ws, Frame::Ping).await;
        let reply = recv(&mut ws).await;
        send(
            &mut ws,
            Frame::Message(Packet::Event {
                namespace: NAMESPACE.to_string(),
                ack_id: None,
                name: "metrics".to_string(),
                args: vec![json!({"cellId": "c1", "temperature": 21})],
            }),
        )
        .await;
        serve_acks(ws).await;
        reply
    });

    let transport = transport(&url, ReconnectOptions::disabled());
    let mut events = transport.connect(None).await.unwrap();
    assert_eq!(next_event(&mut events).await, Some(TransportEvent::Connected));
    assert_eq!(
        next_event(&mut events).await,
        Some(TransportEvent::event(
            "metrics",
            json!({"cellId": "c1", "temperature": 21})
        ))
    );

    transport.close().await.unwrap();
    assert_eq!(server.await.unwrap(), Some(Frame::Pong));
}

#[tokio::test]
async fn test_server_namespace_disconnect_stops_reconnecting() {
    let (listener, url) = listen().await;
    let listener = Arc::new(listener);
    let accepting = Arc::clone(&listener);
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_session(&accepting).await;
        send(
            &mut ws,
            Frame::Message(Packet::Disconnect {
                namespace: NAMESPACE.to_string(),
            }),
        )
        .await;
        ws
    });

    let transport = transport(&url, fast_reconnect());
    let mut events = transport.connect(None).await.unwrap();
    let _ws = server.await.unwrap();

    assert_eq!(next_event(&mut events).await, Some(TransportEvent::Connected));
    assert_eq!(
        next_event(&mut events).await,
        Some(TransportEvent::disconnected("io server disconnect"))
    );
    // The session task has finished: the event queue is closed.
    assert_eq!(next_event(&mut events).await, None);
    assert!(!transport.is_connected());

    let retry = timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(retry.is_err(), "client should not reconnect");
}

#[tokio::test]
async fn test_reconnects_after_drop_with_same_token() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let (ws, first_auth) = accept_session(&listener).await;
        drop(ws);
        let (ws, second_auth) = accept_session(&listener).await;
        tokio::spawn(serve_acks(ws));
        (first_auth, second_auth)
    });

    let transport = transport(&url, fast_reconnect());
    let mut events = transport.connect(Some(TOKEN.to_string())).await.unwrap();

    assert_eq!(next_event(&mut events).await, Some(TransportEvent::Connected));
    assert!(matches!(
        next_event(&mut events).await,
        Some(TransportEvent::Disconnected { .. })
    ));
    assert_eq!(next_event(&mut events).await, Some(TransportEvent::Connected));

    let (first_auth, second_auth) = server.await.unwrap();
    assert_eq!(first_auth.as_deref(), Some("Bearer tok123"));
    assert_eq!(second_auth, first_auth);

    let ack = transport
        .emit_with_ack("subscribeToMetrics", json!({"cellId": "c1"}), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(ack["ok"], true);
    transport.close().await.unwrap();
}

// =============================================================================
// Channel over the real transport
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_channel_connect_then_subscribe() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let (ws, auth) = accept_session(&listener).await;
        serve_acks(ws).await;
        auth
    });

    let transport = Arc::new(transport(&url, ReconnectOptions::disabled()));
    let channel = RealtimeChannel::new(transport, Duration::from_secs(5));
    channel.connect(Some(TOKEN.to_string())).await.unwrap();
    channel.subscribe("c1").await.unwrap();
    assert_eq!(channel.status(), ConnectionStatus::Subscribed);

    channel.dispose().await.unwrap();
    assert_eq!(server.await.unwrap().as_deref(), Some("Bearer tok123"));
}
