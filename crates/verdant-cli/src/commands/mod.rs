//! Command implementations for the CLI.

mod auth;
mod cells;
mod config;
mod control;
mod metrics;
mod users;
mod warehouses;
mod watch;

pub use auth::{cmd_login, cmd_logout, cmd_register, cmd_whoami};
pub use cells::cmd_cells;
pub use config::cmd_config;
pub use control::{cmd_actuator, cmd_mode};
pub use metrics::{MetricsArgs, cmd_metrics};
pub use users::cmd_users;
pub use warehouses::cmd_warehouses;
pub use watch::{WatchArgs, cmd_watch};
