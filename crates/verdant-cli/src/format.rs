//! Output formatting utilities for text, JSON, and CSV output.

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;
use time::OffsetDateTime;
use time::macros::format_description;
use verdant_core::AuthState;
use verdant_types::{
    Actuator, ActuatorState, Cell, Metric, Mode, User, Warehouse, WarehouseStats,
};

use crate::cli::{OutputFormat, StyleMode};
use crate::style;

/// Formatting options for output.
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Use Fahrenheit for temperatures.
    pub fahrenheit: bool,
    /// Omit header row in CSV output.
    pub no_header: bool,
    /// Use compact JSON output (no pretty-printing).
    pub compact: bool,
    /// Visual styling mode.
    pub style: StyleMode,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            no_color: false,
            fahrenheit: false,
            no_header: false,
            compact: false,
            style: StyleMode::Rich,
        }
    }
}

impl FormatOptions {
    pub fn new(no_color: bool, fahrenheit: bool, style: StyleMode) -> Self {
        // Plain mode automatically disables colors for pipe-friendliness
        let effective_no_color = no_color || style == StyleMode::Plain;
        Self {
            no_color: effective_no_color,
            fahrenheit,
            no_header: false,
            compact: false,
            style,
        }
    }

    /// Create with no_header option for CSV output.
    pub fn with_no_header(mut self, no_header: bool) -> Self {
        self.no_header = no_header;
        self
    }

    /// Create with compact JSON option.
    pub fn with_compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Serialize value to JSON string, respecting compact option.
    pub fn as_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        Ok(json + "\n")
    }

    pub fn convert_temp(&self, celsius: f64) -> f64 {
        if self.fahrenheit {
            celsius * 9.0 / 5.0 + 32.0
        } else {
            celsius
        }
    }

    fn temp_unit(&self) -> &'static str {
        if self.fahrenheit { "°F" } else { "°C" }
    }

    /// Format temperature with appropriate unit.
    #[must_use]
    pub fn format_temp(&self, celsius: f64) -> String {
        format!("{:.1}{}", self.convert_temp(celsius), self.temp_unit())
    }

    fn temp_header(&self) -> &'static str {
        if self.fahrenheit { "Temp (F)" } else { "Temp (C)" }
    }

    fn temp_csv_header(&self) -> &'static str {
        if self.fahrenheit {
            "temperature_f"
        } else {
            "temperature_c"
        }
    }
}

/// Escape a string for CSV output.
/// Wraps the value in quotes if it contains commas, quotes, or newlines.
/// Double quotes are escaped by doubling them.
#[must_use]
pub fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Signed change with unit, e.g. `+1.5°C` or `-20 ppm`.
///
/// Returns an empty string when either side is missing.
#[must_use]
pub fn format_delta(current: Option<f64>, previous: Option<f64>, decimals: usize, unit: &str) -> String {
    match (current, previous) {
        (Some(current), Some(previous)) => {
            let diff = current - previous;
            let sign = if diff >= 0.0 { "+" } else { "-" };
            format!("{}{:.*}{}", sign, decimals, diff.abs(), unit)
        }
        _ => String::new(),
    }
}

fn format_timestamp(ts: Option<OffsetDateTime>) -> String {
    ts.and_then(|ts| {
        ts.format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
            .ok()
    })
    .unwrap_or_else(|| "-".to_string())
}

fn opt_value(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|v| format!("{:.*}", decimals, v))
        .unwrap_or_else(|| "-".to_string())
}

fn opt_flag(flag: Option<bool>) -> &'static str {
    match flag {
        Some(true) => "on",
        Some(false) => "off",
        None => "-",
    }
}

fn render_table(headers: &[&str], rows: Vec<Vec<String>>, opts: &FormatOptions) -> String {
    use tabled::builder::Builder;

    let mut builder = Builder::default();
    builder.push_record(headers.iter().copied());
    for row in rows {
        builder.push_record(row);
    }
    let mut table = builder.build();
    style::apply_table_style(&mut table, opts.style);
    let mut output = table.to_string();
    output.push('\n');
    output
}

fn render_csv(headers: &[&str], rows: Vec<Vec<String>>, opts: &FormatOptions) -> String {
    let mut output = if opts.no_header {
        String::new()
    } else {
        headers.join(",") + "\n"
    };
    for row in rows {
        let escaped: Vec<String> = row.iter().map(|v| csv_escape(v)).collect();
        output.push_str(&escaped.join(","));
        output.push('\n');
    }
    output
}

/// Render a list in the requested format.
///
/// Text and CSV share `headers` and `row_of`; JSON serializes `items` as-is.
fn format_list<T: Serialize>(
    format: OutputFormat,
    items: &[T],
    empty: &str,
    headers: &[&str],
    row_of: impl Fn(&T) -> Vec<String>,
    opts: &FormatOptions,
) -> Result<String> {
    let rows = || items.iter().map(&row_of).collect::<Vec<_>>();
    Ok(match format {
        OutputFormat::Json => opts.as_json(items)?,
        OutputFormat::Csv => render_csv(headers, rows(), opts),
        OutputFormat::Text if items.is_empty() => format!("{}\n", empty),
        OutputFormat::Text => render_table(headers, rows(), opts),
    })
}

// ============================================================================
// Resources
// ============================================================================

pub fn format_warehouses(
    warehouses: &[Warehouse],
    format: OutputFormat,
    opts: &FormatOptions,
) -> Result<String> {
    let headers: &[&str] = match format {
        OutputFormat::Csv => &["id", "name", "capacity", "mac", "farm_id", "manager_id", "created_at"],
        _ => &["ID", "Name", "Capacity", "MAC", "Farm", "Manager", "Created"],
    };
    format_list(
        format,
        warehouses,
        "No warehouses found.",
        headers,
        |w| {
            vec![
                w.id.clone(),
                w.name.clone(),
                w.capacity.to_string(),
                w.mac.clone().unwrap_or_default(),
                w.farm_id.clone().unwrap_or_default(),
                w.manager_id.clone().unwrap_or_default(),
                format_timestamp(w.created_at),
            ]
        },
        opts,
    )
}

pub fn format_warehouse_stats(
    stats: &WarehouseStats,
    format: OutputFormat,
    opts: &FormatOptions,
) -> Result<String> {
    let values = [
        ("Nutrients", WarehouseStats::display(stats.nutrients.as_ref())),
        ("Water", WarehouseStats::display(stats.water.as_ref())),
        ("Energy", WarehouseStats::display(stats.energy.as_ref())),
    ];
    Ok(match format {
        OutputFormat::Json => opts.as_json(stats)?,
        OutputFormat::Csv => render_csv(
            &["nutrients", "water", "energy"],
            vec![values.iter().map(|(_, v)| v.clone()).collect()],
            opts,
        ),
        OutputFormat::Text => {
            let mut output = style::format_title("Warehouse statistics", opts.no_color);
            output.push('\n');
            for (label, value) in values {
                output.push_str(&format!("  {:<10} {}\n", label, value));
            }
            output
        }
    })
}

pub fn format_cells(cells: &[Cell], format: OutputFormat, opts: &FormatOptions) -> Result<String> {
    let headers: &[&str] = match format {
        OutputFormat::Csv => &["id", "name", "warehouse_id", "row", "column"],
        _ => &["ID", "Name", "Warehouse", "Row", "Column"],
    };
    format_list(
        format,
        cells,
        "No cells found.",
        headers,
        |c| {
            vec![
                c.id.clone(),
                c.name.clone(),
                c.warehouse_id.clone(),
                c.row_number.to_string(),
                c.column_number.to_string(),
            ]
        },
        opts,
    )
}

pub fn format_users(users: &[User], format: OutputFormat, opts: &FormatOptions) -> Result<String> {
    let headers: &[&str] = match format {
        OutputFormat::Csv => &["id", "name", "email", "phone", "role", "created_at"],
        _ => &["ID", "Name", "Email", "Phone", "Role", "Created"],
    };
    format_list(
        format,
        users,
        "No users found.",
        headers,
        |u| {
            vec![
                u.id.clone(),
                u.name.clone(),
                u.email.clone(),
                u.phone.clone(),
                u.role.clone(),
                format_timestamp(u.created_at),
            ]
        },
        opts,
    )
}

/// Signed-in user summary for `whoami`.
pub fn format_auth_text(auth: &AuthState, opts: &FormatOptions) -> String {
    let Some(claims) = auth.payload.as_ref().filter(|_| auth.is_auth) else {
        return style::format_warning("Not signed in", opts.no_color) + "\n";
    };
    let mut output = style::format_title("Signed in", opts.no_color);
    output.push('\n');
    let rows = [
        ("User", claims.user_id()),
        ("Name", claims.name.as_deref()),
        ("Email", claims.email.as_deref()),
        ("Role", claims.role.as_deref()),
    ];
    for (label, value) in rows {
        if let Some(value) = value {
            output.push_str(&format!("  {:<6} {}\n", label, value));
        }
    }
    if let Some(exp) = claims.exp.and_then(|e| OffsetDateTime::from_unix_timestamp(e).ok()) {
        output.push_str(&format!("  {:<6} {}\n", "Until", format_timestamp(Some(exp))));
    }
    output
}

// ============================================================================
// Metrics
// ============================================================================

pub fn format_metrics(metrics: &[Metric], format: OutputFormat, opts: &FormatOptions) -> Result<String> {
    match format {
        OutputFormat::Json => {
            // Temperatures stay in Celsius in JSON
            opts.as_json(metrics)
        }
        OutputFormat::Csv => Ok(render_csv(
            &["date", opts.temp_csv_header(), "humidity", "co2"],
            metrics.iter().map(|m| metric_row(m, opts, false)).collect(),
            opts,
        )),
        OutputFormat::Text => Ok(format_metrics_text(metrics, opts)),
    }
}

fn metric_row(metric: &Metric, opts: &FormatOptions, with_units: bool) -> Vec<String> {
    let temp = match (metric.temperature, with_units) {
        (Some(t), true) => opts.format_temp(t),
        (t, _) => opt_value(t.map(|t| opts.convert_temp(t)), 1),
    };
    vec![
        metric.date.clone(),
        temp,
        opt_value(metric.humidity, 1),
        opt_value(metric.co2, 0),
    ]
}

fn format_metrics_text(metrics: &[Metric], opts: &FormatOptions) -> String {
    if metrics.is_empty() {
        return "No data for this period.\n".to_string();
    }

    // Narrow terminals get fewer rows to avoid wrapping
    let max_rows = if style::terminal_width() < 80 { 24 } else { 48 };

    let mut output = format!("Metrics ({} buckets):\n\n", metrics.len());
    output.push_str(&render_table(
        &["Date", opts.temp_header(), "Humidity (%)", "CO2 (ppm)"],
        metrics
            .iter()
            .take(max_rows)
            .map(|m| metric_row(m, opts, true))
            .collect(),
        opts,
    ));

    if metrics.len() > max_rows {
        output.push_str(&format!("... and {} more buckets\n", metrics.len() - max_rows));
        output.push_str("(Use --format csv or --format json for full data)\n");
    }
    output
}

// ============================================================================
// Live view
// ============================================================================

/// One line per live reading, with the change since the previous one.
#[must_use]
pub fn format_watch_line(metric: &Metric, previous: Option<&Metric>, opts: &FormatOptions) -> String {
    let time = metric
        .date
        .get(11..19)
        .unwrap_or(metric.date.as_str())
        .to_string();

    let mut parts = vec![format!("[{}]", time)];

    if let Some(temp) = metric.temperature {
        let delta = format_delta(
            Some(opts.convert_temp(temp)),
            previous.and_then(|p| p.temperature).map(|t| opts.convert_temp(t)),
            1,
            opts.temp_unit(),
        );
        let value = opts.format_temp(temp);
        if delta.is_empty() {
            parts.push(value);
        } else if opts.no_color {
            parts.push(format!("{} ({})", value, delta));
        } else {
            parts.push(format!("{} ({})", value, delta.dimmed()));
        }
    }
    if let Some(humidity) = metric.humidity {
        parts.push(format!("{:.0}%", humidity));
    }
    if let Some(co2) = metric.co2 {
        match previous.and_then(|p| p.co2) {
            Some(prev) => parts.push(format!(
                "{:.0} ppm {}",
                co2,
                style::trend_indicator(co2, prev, opts.no_color)
            )),
            None => parts.push(format!("{:.0} ppm", co2)),
        }
    }
    if let Some(light) = metric.light_intensity {
        parts.push(format!("{:.0} lx", light));
    }
    if let Some(moisture) = metric.moisture {
        parts.push(format!("moisture {:.0}%", moisture));
    }

    let flags = [
        ("light", metric.light),
        ("air", metric.air),
        ("water", metric.water),
    ]
    .iter()
    .filter(|(_, on)| *on == Some(true))
    .map(|(name, _)| *name)
    .collect::<Vec<_>>();
    if !flags.is_empty() {
        parts.push(format!("[{}]", flags.join(" ")));
    }

    parts.join("  ") + "\n"
}

#[must_use]
pub fn format_watch_csv_header(opts: &FormatOptions) -> String {
    if opts.no_header {
        return String::new();
    }
    format!(
        "timestamp,{},humidity,light_intensity,moisture,light,air_pump,water_pump\n",
        opts.temp_csv_header()
    )
}

#[must_use]
pub fn format_watch_csv_line(metric: &Metric, opts: &FormatOptions) -> String {
    format!(
        "{},{},{},{},{},{},{},{}\n",
        csv_escape(&metric.date),
        opt_value(metric.temperature.map(|t| opts.convert_temp(t)), 1),
        opt_value(metric.humidity, 1),
        opt_value(metric.light_intensity, 0),
        opt_value(metric.moisture, 1),
        opt_flag(metric.light),
        opt_flag(metric.air),
        opt_flag(metric.water),
    )
}

// ============================================================================
// Control
// ============================================================================

/// Mode and actuator panel for a cell.
#[must_use]
pub fn format_actuators_text(
    cell_id: &str,
    mode: Mode,
    actuators: &ActuatorState,
    opts: &FormatOptions,
) -> String {
    let mut output = style::format_title(&format!("Cell {}", cell_id), opts.no_color);
    output.push('\n');
    output.push_str(&format!(
        "  {:<11} {}\n",
        "Mode",
        style::format_mode(mode, opts.no_color)
    ));
    for actuator in Actuator::ALL {
        output.push_str(&format!(
            "  {:<11} {}\n",
            actuator.to_string(),
            style::format_switch(actuators.get(actuator), opts.no_color)
        ));
    }
    if mode == Mode::Automatic {
        output.push_str(&format!(
            "\n{}\n",
            style::format_info("Switch to Manual mode to control actuators", opts.no_color)
        ));
    }
    output
}
