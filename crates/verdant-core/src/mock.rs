//! Mock backend and transport for testing.
//!
//! [`MockBackend`] implements [`CellBackend`] and [`MockTransport`]
//! implements [`ChannelTransport`], so the view-model, the controller and
//! the channel adapter can be exercised without a server.
//!
//! # Features
//!
//! - **Failure injection**: fail every call, or only actuator commands
//! - **Latency simulation**: delay metric fetches to provoke races
//! - **Recording**: every query, mode update, command and emitted event is kept
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use verdant_core::{CellBackend, MockBackend};
//! use verdant_types::Mode;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = Arc::new(MockBackend::new().with_mode(Mode::Manual));
//!     assert_eq!(backend.fetch_mode("c1").await.unwrap(), Mode::Manual);
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{RwLock, mpsc};

use verdant_types::{CommandPayload, Metric, Mode};

use crate::error::{Error, Result};
use crate::events::TransportEvent;
use crate::history::{MetricQuery, label_series};
use crate::traits::{CellBackend, ChannelTransport};

/// In-memory stand-in for the cell endpoints of the backend.
pub struct MockBackend {
    mode: RwLock<Mode>,
    series: RwLock<HashMap<MetricQuery, Vec<Metric>>>,
    default_series: RwLock<Vec<Metric>>,
    queries: RwLock<Vec<MetricQuery>>,
    mode_updates: RwLock<Vec<(String, Mode)>>,
    commands: RwLock<Vec<(String, CommandPayload)>>,
    fetch_count: AtomicU32,
    should_fail: AtomicBool,
    fail_commands: AtomicBool,
    /// Simulated fetch latency in milliseconds (0 = no delay).
    fetch_latency_ms: AtomicU64,
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend")
            .field("fetch_count", &self.fetch_count.load(Ordering::Relaxed))
            .field("should_fail", &self.should_fail.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Backend in Automatic mode with no metrics.
    pub fn new() -> Self {
        Self {
            mode: RwLock::new(Mode::Automatic),
            series: RwLock::new(HashMap::new()),
            default_series: RwLock::new(Vec::new()),
            queries: RwLock::new(Vec::new()),
            mode_updates: RwLock::new(Vec::new()),
            commands: RwLock::new(Vec::new()),
            fetch_count: AtomicU32::new(0),
            should_fail: AtomicBool::new(false),
            fail_commands: AtomicBool::new(false),
            fetch_latency_ms: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = RwLock::new(mode);
        self
    }

    /// Buckets returned for any query without a specific series.
    #[must_use]
    pub fn with_series(mut self, buckets: Vec<Metric>) -> Self {
        self.default_series = RwLock::new(buckets);
        self
    }

    /// Buckets returned for exactly `query`.
    pub async fn set_series_for(&self, query: MetricQuery, buckets: Vec<Metric>) {
        self.series.write().await.insert(query, buckets);
    }

    pub async fn set_mode(&self, mode: Mode) {
        *self.mode.write().await = mode;
    }

    pub async fn current_mode(&self) -> Mode {
        *self.mode.read().await
    }

    /// Every query passed to `fetch_metrics`, in order.
    pub async fn queries(&self) -> Vec<MetricQuery> {
        self.queries.read().await.clone()
    }

    pub async fn mode_updates(&self) -> Vec<(String, Mode)> {
        self.mode_updates.read().await.clone()
    }

    /// Every accepted command, in order.
    pub async fn commands(&self) -> Vec<(String, CommandPayload)> {
        self.commands.read().await.clone()
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    /// Make every call fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Make only `send_command` fail.
    pub fn set_fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::Relaxed);
    }

    /// Delay subsequent metric fetches. The latency is read when a fetch
    /// starts, so fetches already in flight keep their delay.
    pub fn set_fetch_latency(&self, latency: Duration) {
        self.fetch_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    fn check_should_fail(&self) -> Result<()> {
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::api(500, "Mock failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl CellBackend for MockBackend {
    async fn fetch_metrics(&self, query: &MetricQuery) -> Result<Vec<Metric>> {
        let latency = self.fetch_latency_ms.load(Ordering::Relaxed);
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        self.queries.write().await.push(query.clone());
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.check_should_fail()?;

        let buckets = match self.series.read().await.get(query) {
            Some(buckets) => buckets.clone(),
            None => self.default_series.read().await.clone(),
        };
        Ok(label_series(query, buckets))
    }

    async fn fetch_mode(&self, _cell_id: &str) -> Result<Mode> {
        self.check_should_fail()?;
        Ok(*self.mode.read().await)
    }

    async fn update_mode(&self, cell_id: &str, mode: Mode) -> Result<()> {
        self.check_should_fail()?;
        *self.mode.write().await = mode;
        self.mode_updates.write().await.push((cell_id.to_string(), mode));
        Ok(())
    }

    async fn send_command(&self, cell_id: &str, command: &CommandPayload) -> Result<()> {
        self.check_should_fail()?;
        if self.fail_commands.load(Ordering::Relaxed) {
            return Err(Error::api(502, "Mock command failure"));
        }
        self.commands
            .write()
            .await
            .push((cell_id.to_string(), *command));
        Ok(())
    }
}

#[derive(Debug)]
struct TransportState {
    events: Option<mpsc::Sender<TransportEvent>>,
    connected: bool,
    last_token: Option<String>,
    connect_count: u32,
    emitted: Vec<(String, Value)>,
    ack_response: Option<Value>,
    should_fail: bool,
}

/// Scripted real-time transport.
///
/// `connect` succeeds immediately and reports `Connected`; tests then drive
/// drops, reconnects and inbound events by hand.
#[derive(Debug)]
pub struct MockTransport {
    state: Mutex<TransportState>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Transport that acknowledges every emit with `{"status": "ok"}`.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TransportState {
                events: None,
                connected: false,
                last_token: None,
                connect_count: 0,
                emitted: Vec::new(),
                ack_response: Some(json!({ "status": "ok" })),
                should_fail: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn send(state: &TransportState, event: TransportEvent) {
        if let Some(events) = &state.events
            && events.try_send(event).is_err()
        {
            tracing::debug!("Mock transport event dropped");
        }
    }

    /// Token passed to the latest `connect`.
    pub fn last_token(&self) -> Option<String> {
        self.state().last_token.clone()
    }

    pub fn connect_count(&self) -> u32 {
        self.state().connect_count
    }

    /// Every emitted event with its payload, in order.
    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.state().emitted.clone()
    }

    pub fn emitted_count(&self, event: &str) -> usize {
        self.state()
            .emitted
            .iter()
            .filter(|(name, _)| name == event)
            .count()
    }

    /// Acknowledgment returned by `emit_with_ack`; `None` makes every emit
    /// time out.
    pub fn set_ack_response(&self, response: Option<Value>) {
        self.state().ack_response = response;
    }

    /// Make the next `connect` fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.state().should_fail = fail;
    }

    /// Simulate a dropped link.
    pub fn drop_connection(&self, reason: &str) {
        let mut state = self.state();
        state.connected = false;
        Self::send(&state, TransportEvent::disconnected(reason));
    }

    /// Simulate a successful automatic reconnect.
    pub fn restore_connection(&self) {
        let mut state = self.state();
        state.connected = true;
        Self::send(&state, TransportEvent::Connected);
    }

    /// Deliver an arbitrary event to the channel.
    pub fn inject(&self, event: TransportEvent) {
        Self::send(&self.state(), event);
    }
}

#[async_trait]
impl ChannelTransport for MockTransport {
    async fn connect(&self, token: Option<String>) -> Result<mpsc::Receiver<TransportEvent>> {
        let mut state = self.state();
        if state.should_fail {
            return Err(Error::channel("Mock connect failure"));
        }
        let (tx, rx) = mpsc::channel(64);
        state.last_token = token;
        state.connect_count += 1;
        state.connected = true;
        state.events = Some(tx);
        Self::send(&state, TransportEvent::Connected);
        Ok(rx)
    }

    async fn emit_with_ack(&self, event: &str, payload: Value, timeout: Duration) -> Result<Value> {
        let mut state = self.state();
        state.emitted.push((event.to_string(), payload));
        if !state.connected {
            return Err(Error::ChannelClosed);
        }
        state.ack_response.clone().ok_or_else(|| Error::AckTimeout {
            event: event.to_string(),
            timeout,
        })
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state();
        state.connected = false;
        state.events = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdant_types::Scope;

    #[tokio::test]
    async fn test_backend_records_and_labels() {
        let backend = MockBackend::new().with_series(vec![Metric {
            month: Some(4),
            day: Some(5),
            temperature: Some(21.0),
            ..Default::default()
        }]);
        let query = MetricQuery::new("c1", Scope::Month, 2024).month(4);
        let series = backend.fetch_metrics(&query).await.unwrap();
        assert_eq!(series[0].date, "2024-04-05");
        assert_eq!(series[0].cell_id, "c1");
        assert_eq!(backend.fetch_count(), 1);
        assert_eq!(backend.queries().await, vec![query]);
    }

    #[tokio::test]
    async fn test_backend_failure_injection() {
        let backend = MockBackend::new();
        backend.set_fail_commands(true);
        assert!(backend.fetch_mode("c1").await.is_ok());
        assert!(
            backend
                .send_command("c1", &CommandPayload::default())
                .await
                .is_err()
        );
        backend.set_should_fail(true);
        assert!(backend.fetch_mode("c1").await.is_err());
    }

    #[tokio::test]
    async fn test_transport_scripted_events() {
        let transport = MockTransport::new();
        let mut events = transport.connect(Some("t".into())).await.unwrap();
        assert!(matches!(events.recv().await, Some(TransportEvent::Connected)));

        transport.drop_connection("ping timeout");
        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::Disconnected { .. })
        ));
        let err = transport
            .emit_with_ack("subscribeToMetrics", json!({}), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));

        transport.close().await.unwrap();
        assert!(events.recv().await.is_none());
    }
}
