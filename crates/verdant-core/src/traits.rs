//! Trait abstractions for the backend and the real-time transport.
//!
//! [`CellBackend`] covers the REST calls the view-model and controller need;
//! [`ChannelTransport`] covers the publish/subscribe connection. Both are
//! implemented by real clients and by the mocks in [`crate::mock`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use verdant_types::{CommandPayload, Metric, Mode};

use crate::client::ApiClient;
use crate::error::Result;
use crate::events::TransportEvent;
use crate::history::MetricQuery;

/// Per-cell REST operations.
///
/// # Example
///
/// ```ignore
/// use verdant_core::{CellBackend, Result};
///
/// async fn show_mode<B: CellBackend>(backend: &B, cell: &str) -> Result<()> {
///     println!("{} is {}", cell, backend.fetch_mode(cell).await?);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait CellBackend: Send + Sync {
    /// Labelled historical series.
    async fn fetch_metrics(&self, query: &MetricQuery) -> Result<Vec<Metric>>;

    /// Current mode of a cell.
    async fn fetch_mode(&self, cell_id: &str) -> Result<Mode>;

    /// Switch the mode of a cell.
    async fn update_mode(&self, cell_id: &str, mode: Mode) -> Result<()>;

    /// Send a full actuator payload.
    async fn send_command(&self, cell_id: &str, command: &CommandPayload) -> Result<()>;
}

#[async_trait]
impl CellBackend for ApiClient {
    async fn fetch_metrics(&self, query: &MetricQuery) -> Result<Vec<Metric>> {
        ApiClient::fetch_metrics(self, query).await
    }

    async fn fetch_mode(&self, cell_id: &str) -> Result<Mode> {
        ApiClient::fetch_mode(self, cell_id).await
    }

    async fn update_mode(&self, cell_id: &str, mode: Mode) -> Result<()> {
        ApiClient::update_mode(self, cell_id, mode).await
    }

    async fn send_command(&self, cell_id: &str, command: &CommandPayload) -> Result<()> {
        ApiClient::send_command(self, cell_id, command).await
    }
}

/// A namespaced publish/subscribe connection.
///
/// The transport owns reconnection: after `connect` succeeds it keeps the
/// link alive and reports every (re)connection and drop on the event
/// receiver until [`ChannelTransport::close`] is called.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Open the connection with `token` as bearer credential.
    ///
    /// The token is captured once; reconnections reuse it.
    async fn connect(&self, token: Option<String>) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Emit `event` and wait up to `timeout` for the server's acknowledgment.
    async fn emit_with_ack(
        &self,
        event: &str,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value>;

    /// Close the connection and stop reconnecting.
    async fn close(&self) -> Result<()>;

    /// Whether the link is currently up.
    fn is_connected(&self) -> bool;
}
