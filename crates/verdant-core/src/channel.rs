//! Real-time channel adapter.
//!
//! [`RealtimeChannel`] wraps a [`ChannelTransport`] with the behavior pages
//! rely on:
//!
//! - a three-state [`ConnectionStatus`] (`Disconnected → Connected →
//!   Subscribed`), where `Subscribed` requires a server acknowledgment
//! - per-cell `subscribeToMetrics` requests, repeated after every reconnect
//! - a registry of `metrics` handlers, each removable by its [`ListenerId`]
//!
//! One channel is shared by every consumer in a process. It is constructed
//! explicitly and handed out by clone, so tests can drive it with a
//! [`MockTransport`](crate::mock::MockTransport).
//!
//! Delivery is at-most-once with no ordering guarantee; handlers must
//! tolerate gaps and reordering.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use verdant_types::LiveMetric;

use crate::error::Result;
use crate::events::{ConnectionStatus, TransportEvent};
use crate::traits::ChannelTransport;

/// Server event carrying telemetry.
pub const METRICS_EVENT: &str = "metrics";

/// Client event requesting telemetry for a cell.
pub const SUBSCRIBE_EVENT: &str = "subscribeToMetrics";

/// Handle returned by [`RealtimeChannel::on_metric`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// One inbound `metrics` event.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricEvent {
    /// Cell named in the payload, when the server includes one.
    pub cell_id: Option<String>,
    pub metric: LiveMetric,
    /// When this client received the event.
    pub received_at: OffsetDateTime,
}

impl MetricEvent {
    /// Parse a `metrics` payload received now.
    pub fn from_payload(payload: Value) -> Result<Self> {
        Self::from_payload_at(payload, OffsetDateTime::now_utc())
    }

    pub fn from_payload_at(payload: Value, received_at: OffsetDateTime) -> Result<Self> {
        let cell_id = payload
            .get("cellId")
            .and_then(Value::as_str)
            .map(str::to_string);
        let metric = serde_json::from_value(payload)?;
        Ok(Self {
            cell_id,
            metric,
            received_at,
        })
    }

    /// Whether this event may belong to `cell_id`.
    ///
    /// Events without a cell are assumed to belong to every subscriber.
    pub fn concerns(&self, cell_id: &str) -> bool {
        self.cell_id.as_deref().is_none_or(|id| id == cell_id)
    }
}

/// Callback for `metrics` events.
pub type MetricHandler = Arc<dyn Fn(&MetricEvent) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Inner {
    transport: Arc<dyn ChannelTransport>,
    ack_timeout: Duration,
    listeners: Mutex<BTreeMap<ListenerId, MetricHandler>>,
    next_listener: AtomicU64,
    subscriptions: Mutex<BTreeSet<String>>,
    status: watch::Sender<ConnectionStatus>,
    pump: Mutex<Option<CancellationToken>>,
}

/// Process-wide real-time connection.
///
/// Cheap to clone; clones share the connection and the handler registry.
#[derive(Clone)]
pub struct RealtimeChannel {
    inner: Arc<Inner>,
}

impl fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("status", &self.status())
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

impl RealtimeChannel {
    /// Channel over `transport`, waiting `ack_timeout` for subscription acks.
    pub fn new(transport: Arc<dyn ChannelTransport>, ack_timeout: Duration) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(Inner {
                transport,
                ack_timeout,
                listeners: Mutex::new(BTreeMap::new()),
                next_listener: AtomicU64::new(1),
                subscriptions: Mutex::new(BTreeSet::new()),
                status,
                pump: Mutex::new(None),
            }),
        }
    }

    /// Open the transport with `token` as bearer credential.
    ///
    /// The token is read once here; later messages and reconnections reuse it.
    pub async fn connect(&self, token: Option<String>) -> Result<()> {
        let mut events = self.inner.transport.connect(token).await?;
        // Apply the queued Connected now so a subscribe issued right after
        // this returns already sees the link as up.
        if let Ok(first) = events.try_recv() {
            self.dispatch(first);
        }
        let cancel = CancellationToken::new();
        if let Some(previous) = lock(&self.inner.pump).replace(cancel.clone()) {
            previous.cancel();
        }
        tokio::spawn(pump(self.clone(), events, cancel));
        Ok(())
    }

    /// Request telemetry for `cell_id` and wait for the acknowledgment.
    ///
    /// The request is remembered and repeated after every reconnect.
    pub async fn subscribe(&self, cell_id: &str) -> Result<Value> {
        lock(&self.inner.subscriptions).insert(cell_id.to_string());
        self.request_subscription(cell_id).await
    }

    /// Stop repeating the subscription for `cell_id` on reconnect.
    pub fn unsubscribe(&self, cell_id: &str) -> bool {
        lock(&self.inner.subscriptions).remove(cell_id)
    }

    /// Cells with a remembered subscription.
    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.inner.subscriptions).iter().cloned().collect()
    }

    async fn request_subscription(&self, cell_id: &str) -> Result<Value> {
        debug!("Subscribing to metrics for cell {}", cell_id);
        let ack = self
            .inner
            .transport
            .emit_with_ack(SUBSCRIBE_EVENT, json!({ "cellId": cell_id }), self.inner.ack_timeout)
            .await?;
        self.inner.status.send_if_modified(|status| {
            if *status == ConnectionStatus::Connected {
                *status = ConnectionStatus::Subscribed;
                true
            } else {
                false
            }
        });
        info!("Subscribed to cell {}", cell_id);
        Ok(ack)
    }

    /// Register a `metrics` handler.
    pub fn on_metric<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&MetricEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::SeqCst));
        lock(&self.inner.listeners).insert(id, Arc::new(handler));
        debug!("Registered {}", id);
        id
    }

    /// Remove exactly the handler registered under `id`.
    ///
    /// Returns `false` if it was already removed.
    pub fn off_metric(&self, id: ListenerId) -> bool {
        let removed = lock(&self.inner.listeners).remove(&id).is_some();
        if removed {
            debug!("Removed {}", id);
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    /// Receiver notified on every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Apply one transport event.
    ///
    /// Called by the background pump; public so tests can inject events.
    pub fn dispatch(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                self.inner.status.send_replace(ConnectionStatus::Connected);
                let cells = self.subscriptions();
                if !cells.is_empty() {
                    let channel = self.clone();
                    tokio::spawn(async move {
                        for cell in cells {
                            if let Err(e) = channel.request_subscription(&cell).await {
                                warn!("Re-subscribing to cell {} failed: {}", cell, e);
                            }
                        }
                    });
                }
            }
            TransportEvent::Disconnected { reason } => {
                info!("Real-time channel disconnected: {}", reason);
                self.inner.status.send_replace(ConnectionStatus::Disconnected);
            }
            TransportEvent::Event { name, payload } if name == METRICS_EVENT => {
                match MetricEvent::from_payload(payload) {
                    Ok(event) => self.deliver(&event),
                    Err(e) => warn!("Dropping malformed metrics event: {}", e),
                }
            }
            TransportEvent::Event { name, .. } => debug!("Ignoring event {}", name),
        }
    }

    fn deliver(&self, event: &MetricEvent) {
        // Snapshot so handlers may register or remove listeners.
        let handlers: Vec<MetricHandler> = lock(&self.inner.listeners).values().cloned().collect();
        for handler in handlers {
            handler(event);
        }
    }

    /// Close the connection and drop every handler and subscription.
    pub async fn dispose(&self) -> Result<()> {
        if let Some(cancel) = lock(&self.inner.pump).take() {
            cancel.cancel();
        }
        lock(&self.inner.listeners).clear();
        lock(&self.inner.subscriptions).clear();
        self.inner.status.send_replace(ConnectionStatus::Disconnected);
        self.inner.transport.close().await
    }
}

async fn pump(
    channel: RealtimeChannel,
    mut events: mpsc::Receiver<TransportEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => channel.dispatch(event),
                None => {
                    debug!("Transport event stream ended");
                    channel.inner.status.send_replace(ConnectionStatus::Disconnected);
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::mock::MockTransport;

    fn channel() -> (RealtimeChannel, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let channel = RealtimeChannel::new(transport.clone(), Duration::from_millis(200));
        (channel, transport)
    }

    #[test]
    fn test_metric_event_parsing() {
        let at = time::macros::datetime!(2024-04-05 10:00 UTC);
        let event = MetricEvent::from_payload_at(
            json!({"cellId": "c1", "temperature": 20.5, "light": 1}),
            at,
        )
        .unwrap();
        assert_eq!(event.cell_id.as_deref(), Some("c1"));
        assert_eq!(event.metric.temperature, Some(20.5));
        assert!(event.concerns("c1"));
        assert!(!event.concerns("c2"));

        let anonymous = MetricEvent::from_payload_at(json!({"co2": 400}), at).unwrap();
        assert!(anonymous.concerns("anything"));

        assert!(MetricEvent::from_payload_at(json!({"temperature": "hot"}), at).is_err());
    }

    #[tokio::test]
    async fn test_off_metric_removes_only_own_handler() {
        let (channel, _) = channel();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        let a = channel.on_metric(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = second.clone();
        let _b = channel.on_metric(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        channel.dispatch(TransportEvent::event(METRICS_EVENT, json!({"temperature": 1.0})));
        assert!(channel.off_metric(a));
        assert!(!channel.off_metric(a));
        channel.dispatch(TransportEvent::event(METRICS_EVENT, json!({"temperature": 2.0})));

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);
        assert_eq!(channel.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_and_foreign_events_are_dropped() {
        let (channel, _) = channel();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        channel.on_metric(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        channel.dispatch(TransportEvent::event(METRICS_EVENT, json!("garbage")));
        channel.dispatch(TransportEvent::event("alerts", json!({"temperature": 3.0})));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let (channel, transport) = channel();
        assert_eq!(channel.status(), ConnectionStatus::Disconnected);

        channel.connect(Some("tok".to_string())).await.unwrap();
        assert_eq!(transport.last_token().as_deref(), Some("tok"));
        tokio::task::yield_now().await;
        assert_eq!(channel.status(), ConnectionStatus::Connected);

        channel.subscribe("c1").await.unwrap();
        assert_eq!(channel.status(), ConnectionStatus::Subscribed);
        assert_eq!(transport.emitted_count(SUBSCRIBE_EVENT), 1);

        transport.drop_connection("transport close");
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(channel.status(), ConnectionStatus::Disconnected);

        channel.dispose().await.unwrap();
        assert_eq!(channel.listener_count(), 0);
        assert!(channel.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_right_after_connect() {
        let (channel, transport) = channel();
        channel.connect(None).await.unwrap();
        assert_eq!(channel.status(), ConnectionStatus::Connected);

        channel.subscribe("c1").await.unwrap();
        assert_eq!(channel.status(), ConnectionStatus::Subscribed);
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(channel.status(), ConnectionStatus::Subscribed);
        assert_eq!(transport.emitted_count(SUBSCRIBE_EVENT), 1);
    }

    #[tokio::test]
    async fn test_unacknowledged_subscription_stays_connected() {
        let (channel, transport) = channel();
        channel.connect(None).await.unwrap();
        tokio::task::yield_now().await;

        transport.set_ack_response(None);
        let result = channel.subscribe("c1").await;
        assert!(result.is_err());
        assert_eq!(channel.status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_resubscribes_after_reconnect() {
        let (channel, transport) = channel();
        channel.connect(None).await.unwrap();
        tokio::task::yield_now().await;
        channel.subscribe("c1").await.unwrap();
        assert_eq!(transport.emitted_count(SUBSCRIBE_EVENT), 1);

        transport.drop_connection("ping timeout");
        transport.restore_connection();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(transport.emitted_count(SUBSCRIBE_EVENT), 2);
        assert_eq!(channel.status(), ConnectionStatus::Subscribed);
    }

    #[tokio::test]
    async fn test_unsubscribed_cell_is_not_requested_again() {
        let (channel, transport) = channel();
        channel.connect(None).await.unwrap();
        channel.subscribe("c1").await.unwrap();
        channel.subscribe("c2").await.unwrap();
        assert!(channel.unsubscribe("c1"));
        assert!(!channel.unsubscribe("c1"));
        assert_eq!(channel.subscriptions(), vec!["c2".to_string()]);

        transport.drop_connection("ping timeout");
        transport.restore_connection();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // c1 and c2 once each, then only c2
        assert_eq!(transport.emitted_count(SUBSCRIBE_EVENT), 3);
    }
}
