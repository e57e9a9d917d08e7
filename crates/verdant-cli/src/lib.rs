//! Command-line interface for the Verdant smart agriculture platform.
//!
//! This crate provides a terminal client for the Verdant backend: sign in,
//! manage warehouses, cells and users, chart historical metrics, stream live
//! telemetry, and drive a cell's mode and actuators.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `login` / `logout` | Start or end a session |
//! | `register` | Create an owner account |
//! | `whoami` | Show the signed-in user |
//! | `warehouses` | List, inspect, create, update and delete warehouses |
//! | `cells` | List, inspect, create, update and delete cells |
//! | `users` | Administer users (admin only) |
//! | `metrics` | Day, month or year aggregates for a cell |
//! | `watch` | Stream live readings for a cell |
//! | `mode` | Show or switch a cell between Manual and Automatic |
//! | `actuator` | Switch the light, pumps or heater (Manual mode) |
//! | `config` | Manage CLI configuration |
//! | `completions` | Generate shell completions |
//!
//! # Output Formats
//!
//! - **Text** (default): Human-readable tables
//! - **JSON**: Machine-readable JSON format
//! - **CSV**: Comma-separated values for spreadsheets
//!
//! # Configuration
//!
//! The CLI stores configuration in `~/.config/verdant/config.toml` (or
//! platform equivalent) and the session next to it in `session.json`.
//!
//! - `url`: Backend base URL
//! - `cell`: Default cell for `metrics`, `watch`, `mode` and `actuator`
//! - `format`: Default output format
//! - `timeout`: Request timeout in seconds
//! - `buffer_capacity`: Live readings kept by `watch`
//!
//! # Environment Variables
//!
//! - `VERDANT_URL`: Backend base URL (overridden by `--url`)
//! - `VERDANT_CONFIG`: Config file location
//! - `ACCESS_JWT_SECRET`: Secret used to verify access tokens locally
//! - `NO_COLOR`: Disable colored output when set
//!
//! # Examples
//!
//! ```bash
//! verdant login --email grower@example.com
//! verdant config set cell 66a1f0c2
//! verdant metrics --scope day --format csv --output today.csv
//! verdant watch --count 20
//! verdant mode 66a1f0c2 manual
//! verdant actuator water-pump on --on light
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod format;
pub mod style;
pub mod util;

pub use verdant_core;
pub use verdant_types;
