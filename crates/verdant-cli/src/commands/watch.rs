//! Watch command implementation.
//!
//! Connects to the real-time channel, subscribes to one cell and prints each
//! reading as it lands in the live buffer. The transport reconnects and the
//! channel resubscribes on its own; status changes are reported on stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use verdant_core::{ConnectionStatus, MetricQuery, MetricsViewModel};
use verdant_types::{Metric, Scope};

use crate::cli::OutputFormat;
use crate::config::resolve_capacity;
use crate::format::{FormatOptions, format_watch_csv_header, format_watch_csv_line, format_watch_line};
use crate::style;
use crate::util::{AppContext, append_output, require_auth, require_cell};

/// Arguments for the watch command.
pub struct WatchArgs<'a> {
    pub cell: Option<String>,
    pub count: u32,
    pub capacity: Option<usize>,
    pub format: OutputFormat,
    pub output: Option<&'a PathBuf>,
    pub opts: &'a FormatOptions,
}

/// Entries of `series` that come after `last`.
///
/// When `last` has already been evicted from the buffer, everything is new.
pub fn unseen<'a>(series: &'a [Metric], last: Option<&Metric>) -> &'a [Metric] {
    match last.and_then(|last| series.iter().rposition(|m| m == last)) {
        Some(pos) => &series[pos + 1..],
        None => series,
    }
}

pub async fn cmd_watch(ctx: &AppContext, args: WatchArgs<'_>) -> Result<()> {
    let WatchArgs {
        cell,
        count,
        capacity,
        format,
        output,
        opts,
    } = args;

    let cell_id = require_cell(cell, &ctx.config)?;
    let client = ctx.client()?;
    require_auth(&client).await?;

    let options = client.options().clone();
    let channel = ctx.channel(&options)?;
    let capacity = resolve_capacity(capacity, &ctx.config);

    let spinner = style::operation_spinner(&format!("Connecting to {}...", ctx.base_url), ctx.quiet);
    let connected = channel.connect(client.access_token()).await;
    spinner.finish_and_clear();
    connected.context("Failed to connect to the real-time channel")?;

    let view = MetricsViewModel::new(
        Arc::new(client),
        channel.clone(),
        MetricQuery::today(cell_id.clone(), Scope::Day),
        capacity,
    );
    view.set_live(true).await;
    channel
        .subscribe(&cell_id)
        .await
        .with_context(|| format!("Subscription to cell {} was not acknowledged", cell_id))?;

    if !ctx.quiet {
        let header = if opts.no_color {
            format!("Watching cell {}", cell_id)
        } else {
            format!("Watching cell {}", cell_id.cyan())
        };
        eprintln!("{}", header);
        if count > 0 {
            eprintln!("Buffer: {} | Count: {} | Press Ctrl+C to stop", capacity, count);
        } else {
            eprintln!("Buffer: {} | Press Ctrl+C to stop", capacity);
        }
        eprintln!("{}", "-".repeat(50));
    }

    let mut changes = view.changes();
    let mut status = channel.watch_status();
    let mut last: Option<Metric> = None;
    let mut header_written = opts.no_header;
    let mut readings: u32 = 0;

    'watch: loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                if current == ConnectionStatus::Disconnected {
                    eprintln!(
                        "{}",
                        style::format_warning("Connection lost. Reconnecting...", opts.no_color)
                    );
                } else if !ctx.quiet {
                    eprintln!("{}", style::format_connection(&current, opts.no_color));
                }
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                changes.borrow_and_update();
                let series = view.series();
                for metric in unseen(&series, last.as_ref()) {
                    let content = match format {
                        OutputFormat::Json => opts.as_json(metric)?,
                        OutputFormat::Csv => {
                            let mut out = String::new();
                            if !header_written {
                                out.push_str(&format_watch_csv_header(opts));
                                header_written = true;
                            }
                            out.push_str(&format_watch_csv_line(metric, opts));
                            out
                        }
                        OutputFormat::Text => format_watch_line(metric, last.as_ref(), opts),
                    };
                    append_output(output, &content)?;
                    last = Some(metric.clone());
                    readings += 1;
                    if count > 0 && readings >= count {
                        if !ctx.quiet {
                            eprintln!("Completed {} readings.", readings);
                        }
                        break 'watch;
                    }
                }
            }
        }
    }

    channel.unsubscribe(&cell_id);
    view.close();
    channel.dispose().await.ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(date: &str) -> Metric {
        Metric {
            cell_id: "c1".to_string(),
            date: date.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_unseen_after_last() {
        let series = vec![reading("a"), reading("b"), reading("c")];
        assert_eq!(unseen(&series, None).len(), 3);
        assert_eq!(unseen(&series, Some(&reading("b"))), &series[2..]);
        assert!(unseen(&series, Some(&reading("c"))).is_empty());
    }

    #[test]
    fn test_unseen_when_last_was_evicted() {
        let series = vec![reading("d"), reading("e")];
        assert_eq!(unseen(&series, Some(&reading("a"))).len(), 2);
    }
}
