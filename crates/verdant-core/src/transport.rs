//! Socket.IO client transport over WebSocket.
//!
//! [`SocketIoTransport`] performs the Engine.IO handshake, joins one
//! namespace, answers pings and keeps the link alive. When the link drops
//! it reconnects with [`ReconnectOptions`] backoff, reusing the bearer token
//! captured at [`ChannelTransport::connect`].
//!
//! ```no_run
//! use verdant_core::{ChannelTransport, ReconnectOptions, SocketIoTransport};
//!
//! # async fn example() -> verdant_core::Result<()> {
//! let transport = SocketIoTransport::new("http://localhost:8000", "/cells", ReconnectOptions::default())?;
//! let mut events = transport.connect(Some("token".to_string())).await?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::events::TransportEvent;
use crate::reconnect::ReconnectOptions;
use crate::socketio::{self, Frame, Handshake, Packet};
use crate::traits::ChannelTransport;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Capacity of the inbound event queue.
const EVENT_QUEUE_CAPACITY: usize = 256;

/// How long to wait for the open packet and namespace confirmation.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the Engine.IO WebSocket endpoint for `base_url`.
///
/// `http` becomes `ws` and `https` becomes `wss`.
pub fn socket_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url.trim_end_matches('/'))
        .map_err(|e| Error::InvalidUrl(format!("{}: {}", base_url, e)))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::InvalidUrl(format!(
                "unsupported scheme '{}' for {}",
                other, base_url
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::InvalidUrl(format!("cannot use {} over WebSocket", base_url)))?;
    url.set_path("/socket.io/");
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct Shared {
    connected: AtomicBool,
    next_ack: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Vec<Value>>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl Shared {
    fn fail_pending(&self) {
        // dropping the senders wakes every waiter with a closed channel
        lock(&self.pending).clear();
    }

    /// Whether `out` is the queue of the current connection.
    fn owns(&self, out: &mpsc::UnboundedSender<String>) -> bool {
        lock(&self.outbound)
            .as_ref()
            .is_some_and(|current| current.same_channel(out))
    }
}

/// Why a live session ended.
enum SessionEnd {
    Cancelled,
    ServerDisconnect,
    Dropped(String),
}

/// Socket.IO v5 client over a single WebSocket.
pub struct SocketIoTransport {
    url: Url,
    namespace: String,
    reconnect: ReconnectOptions,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SocketIoTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketIoTransport")
            .field("url", &self.url.as_str())
            .field("namespace", &self.namespace)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl SocketIoTransport {
    /// Transport for `namespace` on the backend at `base_url`.
    pub fn new(
        base_url: &str,
        namespace: impl Into<String>,
        reconnect: ReconnectOptions,
    ) -> Result<Self> {
        reconnect.validate()?;
        let namespace = namespace.into();
        if !namespace.starts_with('/') {
            return Err(Error::invalid_config("namespace must start with '/'"));
        }
        Ok(Self {
            url: socket_url(base_url)?,
            namespace,
            reconnect,
            shared: Arc::new(Shared::default()),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Open the WebSocket, complete the Engine.IO handshake and join `namespace`.
async fn open_session(
    url: &Url,
    namespace: &str,
    token: Option<&str>,
) -> Result<(WsStream, Handshake)> {
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| Error::channel(format!("bad request: {}", e)))?;
    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| Error::channel(format!("bad token: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let (mut ws, _response) = connect_async(request)
        .await
        .map_err(|e| Error::channel(format!("connect to {} failed: {}", url, e)))?;

    let handshake = timeout(HANDSHAKE_TIMEOUT, join_namespace(&mut ws, namespace))
        .await
        .map_err(|_| Error::channel("handshake timed out"))??;

    Ok((ws, handshake))
}

/// Wait for the open packet, then request and await the namespace.
async fn join_namespace(ws: &mut WsStream, namespace: &str) -> Result<Handshake> {
    let handshake = loop {
        match next_frame(ws).await? {
            Frame::Open(handshake) => break handshake,
            other => debug!("Ignoring {:?} before open", other),
        }
    };

    let join = Frame::Message(Packet::Connect {
        namespace: namespace.to_string(),
        data: None,
    });
    send_frame(ws, &join).await?;

    loop {
        match next_frame(ws).await? {
            Frame::Message(Packet::Connect { namespace: ns, .. }) if ns == namespace => {
                return Ok(handshake);
            }
            Frame::Message(Packet::ConnectError { data, .. }) => {
                return Err(Error::channel(format!(
                    "namespace {} refused: {}",
                    namespace,
                    socketio::connect_error_message(data.as_ref())
                )));
            }
            Frame::Ping => send_frame(ws, &Frame::Pong).await?,
            other => debug!("Ignoring {:?} during namespace join", other),
        }
    }
}

async fn send_frame(ws: &mut WsStream, frame: &Frame) -> Result<()> {
    ws.send(Message::text(socketio::encode(frame)))
        .await
        .map_err(|e| Error::channel(e.to_string()))
}

async fn next_frame(ws: &mut WsStream) -> Result<Frame> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return socketio::decode(text.as_str()),
            Some(Ok(Message::Close(_))) | None => return Err(Error::ChannelClosed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(Error::channel(e.to_string())),
        }
    }
}

/// Outbound queue of one `connect` call, shared by all its sessions.
struct Outbound {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

/// Pump one connected session until it ends.
///
/// Frames queued while no session was up are discarded; their waiters were
/// already failed when the previous session ended.
async fn run_session(
    ws: WsStream,
    handshake: &Handshake,
    namespace: &str,
    shared: &Shared,
    outbound: &mut Outbound,
    events: &mpsc::Sender<TransportEvent>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();
    let out_rx = &mut outbound.rx;

    let liveness = handshake.liveness_timeout();
    let mut deadline = Instant::now() + liveness;

    let end = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let leave = Frame::Message(Packet::Disconnect { namespace: namespace.to_string() });
                let _ = sink.send(Message::text(socketio::encode(&leave))).await;
                let _ = sink.close().await;
                break SessionEnd::Cancelled;
            }
            _ = tokio::time::sleep_until(deadline) => {
                break SessionEnd::Dropped("ping timeout".to_string());
            }
            Some(text) = out_rx.recv() => {
                debug!("-> {}", text);
                if let Err(e) = sink.send(Message::text(text)).await {
                    break SessionEnd::Dropped(format!("write failed: {}", e));
                }
            }
            message = stream.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break SessionEnd::Dropped("transport close".to_string()),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break SessionEnd::Dropped(format!("transport error: {}", e)),
                };
                deadline = Instant::now() + liveness;

                let frame = match socketio::decode(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Dropping unreadable frame: {}", e);
                        continue;
                    }
                };
                match frame {
                    Frame::Ping => {
                        if let Err(e) = sink.send(Message::text(socketio::encode(&Frame::Pong))).await {
                            break SessionEnd::Dropped(format!("write failed: {}", e));
                        }
                    }
                    Frame::Close => break SessionEnd::Dropped("server close".to_string()),
                    Frame::Message(packet) if packet.namespace() == namespace => match packet {
                        Packet::Event { name, mut args, .. } => {
                            debug!("<- event {}", name);
                            let payload = if args.is_empty() { Value::Null } else { args.swap_remove(0) };
                            if events.send(TransportEvent::event(name, payload)).await.is_err() {
                                break SessionEnd::Cancelled;
                            }
                        }
                        Packet::Ack { ack_id, args, .. } => {
                            if let Some(waiter) = lock(&shared.pending).remove(&ack_id) {
                                let _ = waiter.send(args);
                            } else {
                                debug!("Ack {} has no waiter", ack_id);
                            }
                        }
                        Packet::Disconnect { .. } => break SessionEnd::ServerDisconnect,
                        other => debug!("Ignoring {:?}", other),
                    },
                    other => debug!("Ignoring {:?}", other),
                }
            }
        }
    };

    if shared.owns(&outbound.tx) {
        shared.connected.store(false, Ordering::SeqCst);
        shared.fail_pending();
    }
    while out_rx.try_recv().is_ok() {}
    end
}

#[async_trait]
impl ChannelTransport for SocketIoTransport {
    async fn connect(&self, token: Option<String>) -> Result<mpsc::Receiver<TransportEvent>> {
        if self.is_connected() {
            return Err(Error::channel("already connected"));
        }

        let (ws, handshake) = open_session(&self.url, &self.namespace, token.as_deref()).await?;
        info!("Connected to {} namespace {}", self.url, self.namespace);

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let cancel = CancellationToken::new();
        if let Some(previous) = lock(&self.shared.cancel).replace(cancel.clone()) {
            previous.cancel();
        }
        // Queue before the session starts so Connected precedes any event.
        let _ = tx.try_send(TransportEvent::Connected);

        // Emits issued as soon as this returns must find the queue.
        let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
        *lock(&self.shared.outbound) = Some(out_tx.clone());
        self.shared.connected.store(true, Ordering::SeqCst);
        let mut outbound = Outbound { tx: out_tx, rx: out_rx };

        let url = self.url.clone();
        let namespace = self.namespace.clone();
        let reconnect = self.reconnect.clone();
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            let mut session = Some((ws, handshake));
            loop {
                let Some((ws, handshake)) = session.take() else {
                    break;
                };
                let end = run_session(
                    ws,
                    &handshake,
                    &namespace,
                    &shared,
                    &mut outbound,
                    &tx,
                    &cancel,
                )
                .await;
                let reason = match end {
                    SessionEnd::Cancelled => {
                        debug!("Transport closed");
                        break;
                    }
                    SessionEnd::ServerDisconnect => {
                        info!("Server closed namespace {}", namespace);
                        let _ = tx.send(TransportEvent::disconnected("io server disconnect")).await;
                        break;
                    }
                    SessionEnd::Dropped(reason) => reason,
                };
                warn!("Connection lost: {}", reason);
                if tx.send(TransportEvent::disconnected(reason)).await.is_err() {
                    break;
                }

                let mut attempt = 0;
                while reconnect.should_retry(attempt) {
                    let delay = reconnect.jittered_delay(attempt);
                    debug!("Reconnect attempt {} in {:?}", attempt + 1, delay);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = sleep(delay) => {}
                    }
                    match open_session(&url, &namespace, token.as_deref()).await {
                        Ok(next) => {
                            info!("Reconnected after {} attempt(s)", attempt + 1);
                            session = Some(next);
                            break;
                        }
                        Err(e) => {
                            debug!("Reconnect attempt {} failed: {}", attempt + 1, e);
                            attempt += 1;
                        }
                    }
                }

                if session.is_none() {
                    if !cancel.is_cancelled() {
                        warn!("Giving up on {} after {} attempt(s)", url, attempt);
                    }
                    break;
                }
                if shared.owns(&outbound.tx) {
                    shared.connected.store(true, Ordering::SeqCst);
                }
                if tx.send(TransportEvent::Connected).await.is_err() {
                    break;
                }
            }

            if shared.owns(&outbound.tx) {
                shared.connected.store(false, Ordering::SeqCst);
                *lock(&shared.outbound) = None;
            }
        });

        Ok(rx)
    }

    async fn emit_with_ack(
        &self,
        event: &str,
        payload: Value,
        ack_timeout: Duration,
    ) -> Result<Value> {
        let ack_id = self.shared.next_ack.fetch_add(1, Ordering::SeqCst);
        let frame = Frame::Message(Packet::Event {
            namespace: self.namespace.clone(),
            ack_id: Some(ack_id),
            name: event.to_string(),
            args: vec![payload],
        });

        let (waiter_tx, waiter_rx) = oneshot::channel();
        lock(&self.shared.pending).insert(ack_id, waiter_tx);

        let sent = self.is_connected()
            && lock(&self.shared.outbound)
                .as_ref()
                .is_some_and(|out| out.send(socketio::encode(&frame)).is_ok());
        if !sent {
            lock(&self.shared.pending).remove(&ack_id);
            return Err(Error::ChannelClosed);
        }

        match timeout(ack_timeout, waiter_rx).await {
            Ok(Ok(mut args)) => Ok(if args.is_empty() {
                Value::Null
            } else {
                args.swap_remove(0)
            }),
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => {
                lock(&self.shared.pending).remove(&ack_id);
                Err(Error::AckTimeout {
                    event: event.to_string(),
                    timeout: ack_timeout,
                })
            }
        }
    }

    async fn close(&self) -> Result<()> {
        if let Some(cancel) = lock(&self.shared.cancel).take() {
            cancel.cancel();
        }
        self.shared.connected.store(false, Ordering::SeqCst);
        *lock(&self.shared.outbound) = None;
        self.shared.fail_pending();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

impl Drop for SocketIoTransport {
    fn drop(&mut self) {
        if let Some(cancel) = lock(&self.shared.cancel).take() {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_url() {
        let url = socket_url("http://localhost:8000/").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:8000/socket.io/?EIO=4&transport=websocket"
        );

        let url = socket_url("https://api.verdant.farm").unwrap();
        assert_eq!(url.scheme(), "wss");

        assert!(socket_url("ftp://example.com").is_err());
        assert!(socket_url("nope").is_err());
    }

    #[test]
    fn test_new_validates() {
        assert!(SocketIoTransport::new("http://localhost:8000", "cells", ReconnectOptions::default()).is_err());
        let transport =
            SocketIoTransport::new("http://localhost:8000", "/cells", ReconnectOptions::default())
                .unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_emit_without_connection_fails() {
        let transport =
            SocketIoTransport::new("http://localhost:8000", "/cells", ReconnectOptions::default())
                .unwrap();
        let err = transport
            .emit_with_ack("subscribeToMetrics", serde_json::json!({"cellId": "c1"}), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let transport = SocketIoTransport::new(
            "http://127.0.0.1:9",
            "/cells",
            ReconnectOptions::disabled(),
        )
        .unwrap();
        let err = transport.connect(None).await.unwrap_err();
        assert!(matches!(err, Error::Channel(_)));
        assert!(!transport.is_connected());
    }
}
