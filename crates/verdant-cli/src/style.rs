//! Visual styling utilities for the CLI.
//!
//! Spinners, status and message coloring, and table styles shared by
//! every command.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use verdant_core::ConnectionStatus;
use verdant_types::{Mode, Switch};

use crate::cli::StyleMode;

// ============================================================================
// Progress Indicators
// ============================================================================

/// Standard spinner tick characters (Braille dots animation)
const SPINNER_TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Standard spinner tick interval
const SPINNER_TICK_MS: u64 = 80;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(SPINNER_TICK_CHARS)
}

/// Create a spinner for a request in flight.
///
/// Hidden when `quiet` is set so scripted output stays clean.
pub fn operation_spinner(message: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    pb
}

// ============================================================================
// Messages
// ============================================================================

/// Format a success message.
pub fn format_success(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[OK] {}", message)
    } else {
        format!("{} {}", "[OK]".green(), message)
    }
}

/// Format an info message.
pub fn format_info(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[--] {}", message)
    } else {
        format!("{} {}", "[--]".cyan(), message)
    }
}

/// Format a warning message.
pub fn format_warning(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[!!] {}", message)
    } else {
        format!("{} {}", "[!!]".yellow(), message)
    }
}

/// Format a title header.
pub fn format_title(title: &str, no_color: bool) -> String {
    let underline = "━".repeat(title.chars().count());
    if no_color {
        format!("{}\n{}", title, underline)
    } else {
        format!("{}\n{}", title.bold(), underline.dimmed())
    }
}

// ============================================================================
// Domain Coloring
// ============================================================================

/// Mode label, green for Automatic and yellow for Manual.
pub fn format_mode(mode: Mode, no_color: bool) -> String {
    let label = mode.to_string();
    if no_color {
        return label;
    }
    match mode {
        Mode::Automatic => label.green().to_string(),
        Mode::Manual => label.yellow().to_string(),
    }
}

/// Switch label, `ON` or `OFF`.
pub fn format_switch(switch: Switch, no_color: bool) -> String {
    match (switch, no_color) {
        (Switch::On, true) => "ON".to_string(),
        (Switch::Off, true) => "OFF".to_string(),
        (Switch::On, false) => "ON".green().bold().to_string(),
        (Switch::Off, false) => "OFF".dimmed().to_string(),
    }
}

/// Connection status line for the live view.
pub fn format_connection(status: &ConnectionStatus, no_color: bool) -> String {
    let text = status.to_string();
    if no_color {
        return format!("[{}]", text);
    }
    match status {
        ConnectionStatus::Subscribed => format!("[{}]", text.green()),
        ConnectionStatus::Connected => format!("[{}]", text.yellow()),
        ConnectionStatus::Disconnected => format!("[{}]", text.red()),
    }
}

// ============================================================================
// Trend Indicators
// ============================================================================

/// Direction of change between two readings.
///
/// Changes smaller than half a unit read as steady.
pub fn trend_indicator(current: f64, previous: f64, no_color: bool) -> &'static str {
    let diff = current - previous;
    if diff.abs() < 0.5 {
        "-"
    } else if diff > 0.0 {
        if no_color { "^" } else { "↑" }
    } else if no_color {
        "v"
    } else {
        "↓"
    }
}

// ============================================================================
// Tables
// ============================================================================

/// Get terminal width, defaulting to 80 if detection fails.
pub fn terminal_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(80)
}

/// Apply table style based on StyleMode.
pub fn apply_table_style(table: &mut tabled::Table, style: StyleMode) {
    use tabled::settings::Style;
    match style {
        StyleMode::Rich => {
            table.with(Style::rounded());
        }
        StyleMode::Minimal => {
            table.with(Style::psql());
        }
        StyleMode::Plain => {
            table.with(Style::blank());
        }
    }
}
