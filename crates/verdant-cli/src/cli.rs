//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use verdant_types::{Actuator, Scope};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

/// Visual styling mode for output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum StyleMode {
    /// Standard styling with colors
    Minimal,
    /// Rounded tables and full formatting (default)
    #[default]
    Rich,
    /// Plain text with no decorations (for scripting)
    Plain,
}

/// Reusable output format arguments
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Use Fahrenheit for temperature display (overrides --celsius and config)
    #[arg(long, conflicts_with = "celsius")]
    pub fahrenheit: bool,

    /// Use Celsius for temperature display (default, overrides config)
    #[arg(long, conflicts_with = "fahrenheit")]
    pub celsius: bool,

    /// Omit header row in CSV output (useful for appending)
    #[arg(long)]
    pub no_header: bool,
}

impl OutputArgs {
    /// Resolve fahrenheit setting: explicit flags override config
    pub fn resolve_fahrenheit(&self, config_fahrenheit: bool) -> bool {
        if self.fahrenheit {
            true
        } else if self.celsius {
            false
        } else {
            config_fahrenheit
        }
    }

    /// Resolve format: explicit flag, then config, then text
    pub fn resolve_format(&self, config_format: Option<&str>) -> OutputFormat {
        self.format
            .or_else(|| config_format.and_then(|f| OutputFormat::from_str(f, true).ok()))
            .unwrap_or_default()
    }
}

#[derive(Parser)]
#[command(name = "verdant")]
#[command(author, version, about = "CLI for the Verdant smart agriculture platform", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output compact JSON (no pretty-printing)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Visual styling mode
    #[arg(long, global = true, value_enum, default_value = "rich", env = "VERDANT_STYLE")]
    pub style: StyleMode,

    /// Backend base URL (overrides config)
    #[arg(long, global = true, env = "VERDANT_URL")]
    pub url: Option<String>,

    /// Secret used to verify access tokens locally
    #[arg(long, global = true, env = "ACCESS_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Configuration file (defaults to ~/.config/verdant/config.toml)
    #[arg(long, global = true, env = "VERDANT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session
    Login {
        /// Account email
        #[arg(short, long, env = "VERDANT_EMAIL")]
        email: Option<String>,

        /// Account password (prompted when omitted)
        #[arg(long, env = "VERDANT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Create an owner account
    Register {
        /// Full name
        #[arg(long)]
        name: String,

        /// Account email
        #[arg(long)]
        email: String,

        /// Phone number
        #[arg(long)]
        phone: String,
    },

    /// Sign out and clear the stored session
    Logout,

    /// Show the signed-in user
    Whoami {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Manage warehouses
    #[command(alias = "wh")]
    Warehouses {
        #[command(subcommand)]
        action: WarehouseAction,
    },

    /// Manage cells
    Cells {
        #[command(subcommand)]
        action: CellAction,
    },

    /// Manage users (admin only)
    Users {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Show aggregated historical metrics for a cell
    Metrics {
        /// Cell identifier (defaults to the configured cell)
        cell: Option<String>,

        /// Aggregation scope
        #[arg(short, long, default_value = "month")]
        scope: Scope,

        /// Year (defaults to the current year)
        #[arg(short, long)]
        year: Option<i32>,

        /// Month, 1-12 (month and day scopes; defaults to the current month)
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=12))]
        month: Option<u8>,

        /// Day of month (day scope; defaults to today)
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=31))]
        day: Option<u8>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Stream live metrics for a cell
    Watch {
        /// Cell identifier (defaults to the configured cell)
        cell: Option<String>,

        /// Number of readings to show before exiting (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u32,

        /// Live buffer length (defaults to config, then 300)
        #[arg(long)]
        capacity: Option<usize>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show or change a cell's operating mode
    Mode {
        /// Cell identifier (defaults to the configured cell)
        cell: Option<String>,

        /// What to do
        #[arg(value_enum, default_value = "get")]
        action: ModeAction,
    },

    /// Switch an actuator (Manual mode only)
    ///
    /// Each command carries all four actuators. Like a freshly opened
    /// dashboard, the CLI knows no prior positions, so the others are sent
    /// as off unless listed with --on.
    Actuator {
        /// Actuator: light, air-pump, water-pump, heater
        actuator: Actuator,

        /// Desired position
        #[arg(value_enum)]
        state: SwitchAction,

        /// Other actuators to keep on
        #[arg(long, value_delimiter = ',')]
        on: Vec<Actuator>,

        /// Cell identifier (defaults to the configured cell)
        #[arg(short, long)]
        cell: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Mode subcommand values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeAction {
    Get,
    Manual,
    #[value(alias = "auto")]
    Automatic,
    Toggle,
}

/// Actuator positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SwitchAction {
    On,
    Off,
}

#[derive(Debug, Clone, Subcommand)]
pub enum WarehouseAction {
    /// List warehouses
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show nutrient, water and energy statistics
    Stats {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show one warehouse
    Get {
        id: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Create a warehouse
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        capacity: u32,

        /// Hardware MAC identifier
        #[arg(long)]
        mac: Option<String>,

        #[arg(long)]
        farm: Option<String>,

        #[arg(long)]
        manager: Option<String>,
    },

    /// Update a warehouse
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        capacity: Option<u32>,

        #[arg(long)]
        mac: Option<String>,

        #[arg(long)]
        farm: Option<String>,

        #[arg(long)]
        manager: Option<String>,
    },

    /// Delete a warehouse
    #[command(alias = "rm")]
    Delete {
        id: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum CellAction {
    /// List cells
    #[command(alias = "ls")]
    List {
        /// Only cells in this warehouse
        #[arg(short, long)]
        warehouse: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show one cell
    Get {
        id: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Create a cell
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        warehouse: String,

        #[arg(long)]
        row: i32,

        #[arg(long)]
        column: i32,
    },

    /// Update a cell
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        warehouse: Option<String>,

        #[arg(long)]
        row: Option<i32>,

        #[arg(long)]
        column: Option<i32>,
    },

    /// Delete a cell
    #[command(alias = "rm")]
    Delete {
        id: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum UserAction {
    /// List users, one page at a time
    #[command(alias = "ls")]
    List {
        #[arg(long, default_value = "1")]
        page: u32,

        #[arg(long, default_value = "10")]
        limit: u32,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show one user
    Get {
        id: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Create a user (password is prompted)
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        #[arg(long)]
        phone: String,

        #[arg(long, default_value = "owner")]
        role: String,
    },

    /// Update a user
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        /// Use the self-service profile endpoint
        #[arg(long)]
        profile: bool,
    },

    /// Change a user's password (prompted)
    Password { id: String },

    /// Delete a user
    #[command(alias = "rm")]
    Delete {
        id: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

/// Configuration keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigKey {
    /// Backend base URL
    Url,
    /// Default output format
    Format,
    /// Default cell for metrics, watch, mode and actuator
    Cell,
    /// Request timeout in seconds
    Timeout,
    /// Disable colored output
    NoColor,
    /// Use Fahrenheit for temperature
    Fahrenheit,
    /// Mark session cookies secure
    SecureCookies,
    /// Live buffer length
    BufferCapacity,
}

impl ConfigKey {
    /// Name as typed on the command line.
    pub fn name(self) -> &'static str {
        match self {
            ConfigKey::Url => "url",
            ConfigKey::Format => "format",
            ConfigKey::Cell => "cell",
            ConfigKey::Timeout => "timeout",
            ConfigKey::NoColor => "no-color",
            ConfigKey::Fahrenheit => "fahrenheit",
            ConfigKey::SecureCookies => "secure-cookies",
            ConfigKey::BufferCapacity => "buffer-capacity",
        }
    }
}

/// Configuration subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Get a configuration value
    Get {
        /// Configuration key
        #[arg(value_enum)]
        key: ConfigKey,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        #[arg(value_enum)]
        key: ConfigKey,
        /// Configuration value
        value: String,
    },

    /// Unset (remove) a configuration value
    Unset {
        /// Configuration key to remove
        #[arg(value_enum)]
        key: ConfigKey,
    },

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init,
}

/// Parse boolean argument with flexible input
pub fn parse_bool_arg(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" | "enable" | "enabled" => Ok(true),
        "false" | "no" | "off" | "0" | "disable" | "disabled" => Ok(false),
        _ => Err(format!(
            "Invalid boolean value '{}'. Use: true/false, yes/no, on/off, 1/0",
            s
        )),
    }
}
