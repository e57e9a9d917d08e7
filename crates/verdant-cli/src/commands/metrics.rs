//! Historical metrics command.

use std::sync::Arc;

use anyhow::{Result, bail};
use time::OffsetDateTime;
use verdant_core::{LoadState, MetricQuery, MetricsViewModel};
use verdant_types::Scope;

use crate::cli::OutputArgs;
use crate::format::format_metrics;
use crate::style;
use crate::util::{AppContext, require_auth, require_cell};

/// Arguments for the metrics command.
pub struct MetricsArgs {
    pub cell: Option<String>,
    pub scope: Scope,
    pub year: Option<i32>,
    pub month: Option<u8>,
    pub day: Option<u8>,
    pub output: OutputArgs,
}

/// Build the query for the selection, filling gaps from `today`.
pub fn build_query(
    cell_id: String,
    scope: Scope,
    year: Option<i32>,
    month: Option<u8>,
    day: Option<u8>,
    today: time::Date,
) -> MetricQuery {
    let mut query = MetricQuery::for_date(cell_id, scope, today);
    if let Some(year) = year {
        query.year = year;
    }
    if let Some(month) = month {
        query = query.month(month);
    }
    if let Some(day) = day {
        query = query.day(day);
    }
    query
}

pub async fn cmd_metrics(ctx: &AppContext, args: MetricsArgs) -> Result<()> {
    let MetricsArgs {
        cell,
        scope,
        year,
        month,
        day,
        output,
    } = args;

    let cell_id = require_cell(cell, &ctx.config)?;
    let client = ctx.client()?;
    require_auth(&client).await?;

    let query = build_query(cell_id, scope, year, month, day, OffsetDateTime::now_utc().date());
    let options = client.options().clone();
    let channel = ctx.channel(&options)?;
    let view = MetricsViewModel::new(Arc::new(client), channel, query, options.buffer_capacity);

    let spinner = style::operation_spinner(
        &format!("Fetching {} metrics for cell {}...", scope, view.query().cell_id),
        ctx.quiet,
    );
    view.refresh().await;
    spinner.finish_and_clear();

    if let LoadState::Failed(reason) = view.load_state() {
        bail!("Failed to fetch metrics: {}", reason);
    }

    let (format, opts) = ctx.output_settings(&output);
    ctx.write(&format_metrics(&view.series(), format, &opts)?)
}
