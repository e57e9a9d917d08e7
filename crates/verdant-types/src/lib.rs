//! Platform-agnostic types for the Verdant smart agriculture platform.
//!
//! This crate provides the data shapes shared by the client library
//! (verdant-core) and the command-line front-end (verdant-cli).
//!
//! # Features
//!
//! - Telemetry: [`Metric`] series entries and raw [`LiveMetric`] events
//! - Control: [`Mode`], [`Actuator`], [`ActuatorState`], [`CommandPayload`]
//! - Resources: warehouses, cells, and users as the backend returns them
//! - Auth: login/registration bodies and decoded token [`Claims`]
//!
//! # Example
//!
//! ```
//! use verdant_types::{Actuator, ActuatorState, Switch};
//!
//! let state = ActuatorState::default().with(Actuator::Light, Switch::On);
//! assert!(state.to_command().light);
//! ```

pub mod auth;
pub mod error;
pub mod resources;
pub mod types;

pub use auth::{ADMIN_ROLE, Claims, Credentials, OWNER_ROLE, RegisterRequest, Registration};
pub use error::{ParseError, ParseResult};
pub use resources::{
    Cell, CellUpdate, NewCell, NewUser, NewWarehouse, PasswordChange, User, UserUpdate,
    Warehouse, WarehouseStats, WarehouseUpdate,
};
pub use types::{
    Actuator, ActuatorState, CommandPayload, FlagValue, LiveMetric, Metric, Mode, Scope, Switch,
};
