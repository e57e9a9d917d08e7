//! Real-time channel events and connection status.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Something the transport observed on the wire.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum TransportEvent {
    /// The namespace connection is (re)established.
    Connected,
    /// The link dropped; the transport may reconnect on its own.
    Disconnected { reason: String },
    /// A server-emitted event.
    Event {
        name: String,
        payload: serde_json::Value,
    },
}

impl TransportEvent {
    pub fn event(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::Event {
            name: name.into(),
            payload,
        }
    }

    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::Disconnected {
            reason: reason.into(),
        }
    }
}

/// Three-state status of the real-time channel.
///
/// `Subscribed` is only reached once the server has acknowledged a
/// subscription request on the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
    Subscribed,
}

impl ConnectionStatus {
    /// Whether the link is up (connected or subscribed).
    pub fn is_connected(&self) -> bool {
        !matches!(self, ConnectionStatus::Disconnected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Subscribed => write!(f, "Subscribed"),
        }
    }
}
