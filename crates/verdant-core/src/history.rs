//! Aggregated historical metrics.
//!
//! The backend groups readings into buckets (hours of a day, days of a month,
//! months of a year) and returns the bucket's components instead of a
//! timestamp. [`bucket_label`] turns those components into a date label the
//! charts can sort on.
//!
//! Missing components are defaulted (`01` for month/day, `00` for hour)
//! rather than rejected, so partial aggregates still chart.

use time::{Date, OffsetDateTime};
use tracing::debug;

use verdant_types::{Metric, Scope};

use crate::client::ApiClient;
use crate::error::Result;

/// Series requested from `GET /cells/:id/metrics`.
pub const QUERIED_METRICS: &str = "temperature,humidity,co2";

/// Selection driving a historical fetch.
///
/// Two queries compare equal exactly when they would produce the same
/// request, which is what the view-model uses to decide whether to refetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricQuery {
    pub cell_id: String,
    pub scope: Scope,
    pub year: i32,
    /// Selected month (1-12); used by month and day scopes.
    pub month: Option<u8>,
    /// Selected day of month; used by the day scope.
    pub day: Option<u8>,
}

impl MetricQuery {
    pub fn new(cell_id: impl Into<String>, scope: Scope, year: i32) -> Self {
        Self {
            cell_id: cell_id.into(),
            scope,
            year,
            month: None,
            day: None,
        }
    }

    /// Query for `scope` anchored at `date`.
    pub fn for_date(cell_id: impl Into<String>, scope: Scope, date: Date) -> Self {
        Self {
            cell_id: cell_id.into(),
            scope,
            year: date.year(),
            month: Some(u8::from(date.month())),
            day: Some(date.day()),
        }
    }

    /// Query for `scope` anchored at today (UTC).
    pub fn today(cell_id: impl Into<String>, scope: Scope) -> Self {
        Self::for_date(cell_id, scope, OffsetDateTime::now_utc().date())
    }

    #[must_use]
    pub fn month(mut self, month: u8) -> Self {
        self.month = Some(month);
        self
    }

    #[must_use]
    pub fn day(mut self, day: u8) -> Self {
        self.day = Some(day);
        self
    }

    #[must_use]
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Query-string parameters, in request order.
    ///
    /// `month` is sent for month and day scopes, `day` only for the day scope.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("scope", self.scope.as_str().to_string()),
            ("metrics", QUERIED_METRICS.to_string()),
            ("year", self.year.to_string()),
        ];
        if matches!(self.scope, Scope::Month | Scope::Day) {
            pairs.push(("month", self.month.unwrap_or(1).to_string()));
        }
        if self.scope == Scope::Day {
            pairs.push(("day", self.day.unwrap_or(1).to_string()));
        }
        pairs
    }
}

/// Date label for one bucket of `query`'s series.
///
/// - year scope: `YYYY-MM-01`, month from the bucket
/// - month scope: `YYYY-MM-DD`, month from the query, day from the bucket
/// - day scope: `YYYY-MM-DDTHH:00:00`, hour from the bucket
///
/// ```
/// use verdant_core::history::{MetricQuery, bucket_label};
/// use verdant_types::{Metric, Scope};
///
/// let query = MetricQuery::new("c1", Scope::Month, 2024).month(4);
/// let bucket = Metric { month: Some(4), day: Some(5), ..Default::default() };
/// assert_eq!(bucket_label(&query, &bucket), "2024-04-05");
/// ```
pub fn bucket_label(query: &MetricQuery, metric: &Metric) -> String {
    let year = query.year;
    match query.scope {
        Scope::Year => format!("{}-{:02}-01", year, metric.month.unwrap_or(1)),
        Scope::Month => format!(
            "{}-{:02}-{:02}",
            year,
            query.month.unwrap_or(1),
            metric.day.unwrap_or(1)
        ),
        Scope::Day => format!(
            "{}-{:02}-{:02}T{:02}:00:00",
            year,
            query.month.unwrap_or(1),
            query.day.unwrap_or(1),
            metric.hour.unwrap_or(0)
        ),
    }
}

/// Label every bucket and tag it with the queried cell.
pub fn label_series(query: &MetricQuery, buckets: Vec<Metric>) -> Vec<Metric> {
    buckets
        .into_iter()
        .map(|mut metric| {
            metric.date = bucket_label(query, &metric);
            if metric.cell_id.is_empty() {
                metric.cell_id = query.cell_id.clone();
            }
            metric
        })
        .collect()
}

impl ApiClient {
    /// Fetch and label the aggregated series for `query`.
    pub async fn fetch_metrics(&self, query: &MetricQuery) -> Result<Vec<Metric>> {
        let pairs = query.query_pairs();
        let buckets: Vec<Metric> = self
            .get_json_query(
                &format!("/cells/{}/metrics", query.cell_id),
                &pairs,
                "Failed to fetch metrics",
            )
            .await?;
        debug!(
            "Fetched {} {} buckets for cell {}",
            buckets.len(),
            query.scope,
            query.cell_id
        );
        Ok(label_series(query, buckets))
    }
}
