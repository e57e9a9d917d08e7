//! Error types for verdant-core.
//!
//! # Error Handling Policy
//!
//! Failures are handled locally by the caller; nothing is escalated to a
//! central error boundary. The categories behave differently on purpose:
//!
//! | Category | Surfaced as | Caller behavior |
//! |----------|-------------|-----------------|
//! | CRUD calls | [`Error::Api`] / [`Error::NotReachable`] | Show a notification, no retry |
//! | Authentication | `AuthState { is_auth: false, .. }` | Redirect to sign-in, never an error |
//! | Real-time channel | [`ConnectionStatus::Disconnected`](crate::ConnectionStatus) | Absorbed; the transport reconnects |
//! | Mode / command updates | `tracing::warn!` + unchanged state | Silent no-op in the UI |
//!
//! Command failures still return an error, but the controller also records
//! them as [`CommandState::RolledBack`](crate::controller::CommandState) so a
//! UI can show the previous position without handling the error.

use std::time::Duration;

use thiserror::Error;

use verdant_types::{Actuator, Mode, ParseError};

use crate::token::TokenError;

/// Errors that can occur when talking to the Verdant backend.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The backend could not be reached at all.
    #[error("Backend not reachable at {url}: {source}")]
    NotReachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// HTTP request failed after the connection was made.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Invalid base URL or endpoint.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Backend answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Backend-provided `detail`/`message`, or a generic description.
        message: String,
    },

    /// No usable session.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Access token failed verification.
    #[error("Token verification failed: {0}")]
    Token(#[from] TokenError),

    /// Session store could not be read or written.
    #[error("Session store error: {0}")]
    Session(String),

    /// Real-time channel failure (handshake, framing, transport).
    #[error("Channel error: {0}")]
    Channel(String),

    /// The real-time channel has been disposed or its transport ended.
    #[error("Channel closed")]
    ChannelClosed,

    /// The server did not acknowledge an emitted event in time.
    #[error("No acknowledgment for '{event}' within {timeout:?}")]
    AckTimeout {
        /// Event name that was emitted.
        event: String,
        /// How long we waited.
        timeout: Duration,
    },

    /// Actuator commands are only accepted in manual mode.
    #[error("Cell is in {mode} mode; actuator commands require Manual mode")]
    ModeLocked {
        /// Current mode of the cell.
        mode: Mode,
    },

    /// The cell's mode has not been loaded yet.
    #[error("Cell mode is still loading")]
    ModeUnknown,

    /// A command for the same actuator has not been acknowledged yet.
    #[error("A command for {actuator} is already in flight")]
    CommandInFlight {
        /// The busy actuator.
        actuator: Actuator,
    },

    /// Local validation of user input failed.
    #[error(transparent)]
    Validation(#[from] ParseError),

    /// JSON encoding or decoding failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a channel error.
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether the backend rejected our credentials (HTTP 401).
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status: 401, .. })
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias using verdant-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::api(404, "Failed to fetch cell");
        assert_eq!(err.to_string(), "API error (404): Failed to fetch cell");

        let err = Error::ModeLocked {
            mode: Mode::Automatic,
        };
        assert!(err.to_string().contains("Automatic"));

        let err = Error::CommandInFlight {
            actuator: Actuator::WaterPump,
        };
        assert!(err.to_string().contains("Water Pump"));

        let err = Error::AckTimeout {
            event: "subscribeToMetrics".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("subscribeToMetrics"));
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn test_unauthorized_detection() {
        assert!(Error::api(401, "expired").is_unauthorized());
        assert!(!Error::api(403, "forbidden").is_unauthorized());
        assert!(!Error::NotAuthenticated.is_unauthorized());
        assert_eq!(Error::api(500, "boom").status(), Some(500));
        assert_eq!(Error::ChannelClosed.status(), None);
    }

    #[test]
    fn test_validation_error_conversion() {
        let err: Error = ParseError::field("email", "Invalid email address").into();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("email"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "session file missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("session file missing"));
    }
}
