//! Client library for the Verdant smart agriculture backend.
//!
//! This crate talks to the Verdant REST API and its Socket.IO real-time
//! channel, and provides the state machines a dashboard needs on top of them.
//!
//! # Features
//!
//! - **Auth relay**: login, refresh on 401, logout, local JWT verification
//! - **Resource clients**: warehouses, cells and users
//! - **Historical metrics**: day/month/year aggregates with bucket labels
//! - **Real-time channel**: `subscribeToMetrics` / `metrics` over Socket.IO
//! - **View-model**: one chart series, historical or live, never both
//! - **Controller**: mode switching and actuator commands for one cell
//! - **Mocks**: [`MockBackend`] and [`MockTransport`] for tests
//!
//! # Quick Start
//!
//! ```no_run
//! use verdant_core::{ApiClient, ClientOptions};
//! use verdant_core::history::MetricQuery;
//! use verdant_types::{Credentials, Scope};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ApiClient::in_memory(ClientOptions::default())?;
//!     client
//!         .auth()
//!         .login(&Credentials::new("grower@example.com", "secret"))
//!         .await?;
//!
//!     let query = MetricQuery::new("cell-1", Scope::Month, 2024).month(4);
//!     for metric in client.fetch_metrics(&query).await? {
//!         println!("{} {:?}", metric.date, metric.temperature);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Live data
//!
//! ```no_run
//! use std::sync::Arc;
//! use verdant_core::{ClientOptions, RealtimeChannel, ReconnectOptions, SocketIoTransport};
//!
//! # async fn example(token: String) -> verdant_core::Result<()> {
//! let options = ClientOptions::default();
//! let transport = SocketIoTransport::new(
//!     &options.base_url,
//!     &options.namespace,
//!     ReconnectOptions::default(),
//! )?;
//! let channel = RealtimeChannel::new(Arc::new(transport), options.ack_timeout);
//! channel.connect(Some(token)).await?;
//! channel.on_metric(|event| println!("{:?}", event.metric.temperature));
//! channel.subscribe("cell-1").await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod buffer;
pub mod cells;
pub mod channel;
pub mod client;
pub mod commands;
pub mod controller;
pub mod error;
pub mod events;
pub mod history;
pub mod mock;
pub mod options;
pub mod reconnect;
pub mod session;
pub mod socketio;
pub mod token;
pub mod traits;
pub mod transport;
pub mod users;
pub mod view;
pub mod warehouses;

pub use verdant_types::types;

// Core exports
pub use auth::{AuthRelay, AuthState, LoginSession, RouteDecision, route_decision};
pub use client::ApiClient;
pub use error::{Error, Result};
pub use options::{ClientOptions, ClientOptionsBuilder};
pub use token::{TokenError, TokenVerifier, decode_unverified};
pub use traits::{CellBackend, ChannelTransport};

pub use buffer::MetricBuffer;
pub use channel::{ListenerId, MetricEvent, RealtimeChannel};
pub use controller::{CommandController, CommandState, ModeState};
pub use events::{ConnectionStatus, TransportEvent};
pub use history::MetricQuery;
pub use mock::{MockBackend, MockTransport};
pub use reconnect::ReconnectOptions;
pub use session::{
    FileSessionStore, MemorySessionStore, SameSite, SessionCookie, SessionStore, extract_cookie,
};
pub use transport::SocketIoTransport;
pub use users::Page;
pub use view::{LoadState, MetricsView, MetricsViewModel, SeriesMode};

pub use verdant_types::{
    Actuator, ActuatorState, Cell, Claims, CommandPayload, Credentials, LiveMetric, Metric, Mode,
    Scope, Switch, User, Warehouse,
};
