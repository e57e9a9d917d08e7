//! Metrics view-model.
//!
//! Charts show one series that comes either from a historical fetch or from
//! the live channel, never both. [`MetricsView`] is the synchronous state
//! machine; [`MetricsViewModel`] drives it against a [`CellBackend`] and a
//! [`RealtimeChannel`].
//!
//! Historical fetches are tagged with a generation number. When the
//! selection changes while a fetch is in flight, the older result is
//! discarded on arrival instead of overwriting the newer one.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, warn};

use verdant_types::{Metric, Scope};

use crate::buffer::MetricBuffer;
use crate::channel::{ListenerId, RealtimeChannel};
use crate::history::MetricQuery;
use crate::traits::CellBackend;

/// Where the series comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeriesMode {
    #[default]
    Historical,
    Live,
}

/// Progress of the historical series.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    /// Nothing requested yet, or in live mode.
    #[default]
    Idle,
    /// A fetch is in flight.
    Loading,
    /// The buffer holds the result of the latest fetch.
    Ready,
    /// The latest fetch failed; the buffer is empty.
    Failed(String),
}

/// Synchronous core of the view-model.
#[derive(Debug, Clone)]
pub struct MetricsView {
    query: MetricQuery,
    mode: SeriesMode,
    buffer: MetricBuffer,
    load: LoadState,
    generation: u64,
    fetches_issued: u64,
}

impl MetricsView {
    pub fn new(query: MetricQuery, capacity: usize) -> Self {
        Self {
            query,
            mode: SeriesMode::Historical,
            buffer: MetricBuffer::new(capacity),
            load: LoadState::Idle,
            generation: 0,
            fetches_issued: 0,
        }
    }

    pub fn query(&self) -> &MetricQuery {
        &self.query
    }

    pub fn mode(&self) -> SeriesMode {
        self.mode
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load
    }

    pub fn buffer(&self) -> &MetricBuffer {
        &self.buffer
    }

    pub fn series(&self) -> Vec<Metric> {
        self.buffer.to_vec()
    }

    /// Total historical fetches started.
    pub fn fetches_issued(&self) -> u64 {
        self.fetches_issued
    }

    /// Start a fetch for `query` if it differs from the current selection
    /// (or `force` is set). Returns the generation to complete it with.
    ///
    /// Never starts a fetch in live mode; the selection is still recorded,
    /// and a different cell drops the live entries gathered so far.
    pub fn begin_fetch(&mut self, query: MetricQuery, force: bool) -> Option<u64> {
        let changed = query != self.query;
        let cell_changed = query.cell_id != self.query.cell_id;
        self.query = query;
        if self.mode == SeriesMode::Live {
            if cell_changed {
                self.buffer.clear();
            }
            return None;
        }
        if !(changed || force) {
            return None;
        }
        self.generation += 1;
        self.fetches_issued += 1;
        self.load = LoadState::Loading;
        Some(self.generation)
    }

    /// Apply a fetch result. Stale generations and results arriving after a
    /// switch to live mode are ignored; returns whether it was applied.
    pub fn complete_fetch(
        &mut self,
        generation: u64,
        result: std::result::Result<Vec<Metric>, String>,
    ) -> bool {
        if generation != self.generation || self.mode != SeriesMode::Historical {
            return false;
        }
        match result {
            Ok(series) => {
                self.buffer.replace(series);
                self.load = LoadState::Ready;
            }
            Err(message) => {
                self.buffer.clear();
                self.load = LoadState::Failed(message);
            }
        }
        true
    }

    /// Switch to live mode, clearing the series. Returns `false` if already live.
    pub fn enter_live(&mut self) -> bool {
        if self.mode == SeriesMode::Live {
            return false;
        }
        self.mode = SeriesMode::Live;
        // any in-flight fetch is now stale
        self.generation += 1;
        self.buffer.clear();
        self.load = LoadState::Idle;
        true
    }

    /// Switch back to historical mode, clearing the series.
    ///
    /// Returns the generation of the fetch to start for the current query,
    /// or `None` if already historical.
    pub fn leave_live(&mut self) -> Option<u64> {
        if self.mode == SeriesMode::Historical {
            return None;
        }
        self.mode = SeriesMode::Historical;
        self.buffer.clear();
        let query = self.query.clone();
        self.begin_fetch(query, true)
    }

    /// Append a live entry. Ignored in historical mode.
    pub fn push_live(&mut self, metric: Metric) -> bool {
        if self.mode != SeriesMode::Live {
            return false;
        }
        self.buffer.push(metric);
        true
    }

    /// Drop the series (unmount).
    pub fn reset(&mut self) {
        self.generation += 1;
        self.buffer.clear();
        self.load = LoadState::Idle;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Shared {
    view: Mutex<MetricsView>,
    revision: watch::Sender<u64>,
}

impl Shared {
    fn update<R>(&self, f: impl FnOnce(&mut MetricsView) -> R) -> R {
        let result = f(&mut lock(&self.view));
        self.revision.send_modify(|rev| *rev += 1);
        result
    }
}

/// Drives a [`MetricsView`] for one cell.
pub struct MetricsViewModel<B: CellBackend> {
    backend: Arc<B>,
    channel: RealtimeChannel,
    shared: Arc<Shared>,
    listener: Mutex<Option<ListenerId>>,
}

impl<B: CellBackend> std::fmt::Debug for MetricsViewModel<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsViewModel")
            .field("view", &*lock(&self.shared.view))
            .finish_non_exhaustive()
    }
}

impl<B: CellBackend + 'static> MetricsViewModel<B> {
    /// View-model for `query.cell_id`, in historical mode. Nothing is fetched
    /// until [`MetricsViewModel::refresh`] or a selection change.
    pub fn new(backend: Arc<B>, channel: RealtimeChannel, query: MetricQuery, capacity: usize) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            backend,
            channel,
            shared: Arc::new(Shared {
                view: Mutex::new(MetricsView::new(query, capacity)),
                revision,
            }),
            listener: Mutex::new(None),
        }
    }

    /// Snapshot of the current state.
    pub fn view(&self) -> MetricsView {
        lock(&self.shared.view).clone()
    }

    pub fn series(&self) -> Vec<Metric> {
        lock(&self.shared.view).series()
    }

    pub fn load_state(&self) -> LoadState {
        lock(&self.shared.view).load_state().clone()
    }

    pub fn mode(&self) -> SeriesMode {
        lock(&self.shared.view).mode()
    }

    pub fn query(&self) -> MetricQuery {
        lock(&self.shared.view).query().clone()
    }

    /// Receiver bumped on every state change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// Refetch the current selection.
    pub async fn refresh(&self) -> bool {
        let ticket = self.shared.update(|view| {
            let query = view.query().clone();
            view.begin_fetch(query, true).map(|g| (g, view.query().clone()))
        });
        self.run_fetch(ticket).await
    }

    /// Change the selection; fetches only if it actually changed.
    ///
    /// Returns whether the fetch result was applied.
    pub async fn set_query(&self, query: MetricQuery) -> bool {
        let ticket = self.shared.update(|view| {
            view.begin_fetch(query, false)
                .map(|g| (g, view.query().clone()))
        });
        self.run_fetch(ticket).await
    }

    pub async fn set_scope(&self, scope: Scope) -> bool {
        self.set_query(self.query().scope(scope)).await
    }

    pub async fn set_year(&self, year: i32) -> bool {
        let mut query = self.query();
        query.year = year;
        self.set_query(query).await
    }

    pub async fn set_month(&self, month: u8) -> bool {
        self.set_query(self.query().month(month)).await
    }

    pub async fn set_day(&self, day: u8) -> bool {
        self.set_query(self.query().day(day)).await
    }

    async fn run_fetch(&self, ticket: Option<(u64, MetricQuery)>) -> bool {
        let Some((generation, query)) = ticket else {
            return false;
        };
        debug!("Fetching {} series for cell {} (generation {})", query.scope, query.cell_id, generation);

        let result = self
            .backend
            .fetch_metrics(&query)
            .await
            .map_err(|e| {
                warn!("Failed to fetch metrics for cell {}: {}", query.cell_id, e);
                e.to_string()
            });
        let applied = self
            .shared
            .update(|view| view.complete_fetch(generation, result));
        if !applied {
            debug!("Discarded stale fetch (generation {})", generation);
        }
        applied
    }

    /// Switch between historical and live series. Either way the buffer is
    /// cleared; leaving live mode refetches the current selection.
    pub async fn set_live(&self, live: bool) -> bool {
        if live {
            self.go_live()
        } else {
            self.go_historical().await
        }
    }

    fn go_live(&self) -> bool {
        if !self.shared.update(MetricsView::enter_live) {
            return false;
        }
        let shared = Arc::clone(&self.shared);
        // the selected cell is read per event so a later set_query retargets it
        let id = self.channel.on_metric(move |event| {
            let cell_id = lock(&shared.view).query().cell_id.clone();
            if !event.concerns(&cell_id) {
                return;
            }
            let metric = Metric::from_live(&cell_id, &event.metric, event.received_at);
            shared.update(|view| view.push_live(metric));
        });
        if let Some(stale) = lock(&self.listener).replace(id) {
            self.channel.off_metric(stale);
        }
        true
    }

    async fn go_historical(&self) -> bool {
        if let Some(id) = lock(&self.listener).take() {
            self.channel.off_metric(id);
        }
        let ticket = self
            .shared
            .update(|view| view.leave_live().map(|g| (g, view.query().clone())));
        if ticket.is_none() {
            return false;
        }
        self.run_fetch(ticket).await;
        true
    }

    /// Detach from the channel and drop the series.
    pub fn close(&self) {
        if let Some(id) = lock(&self.listener).take() {
            self.channel.off_metric(id);
        }
        self.shared.update(MetricsView::reset);
    }
}

impl<B: CellBackend> Drop for MetricsViewModel<B> {
    fn drop(&mut self) {
        if let Some(id) = lock(&self.listener).take() {
            self.channel.off_metric(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(month: u8) -> MetricQuery {
        MetricQuery::new("c1", Scope::Month, 2024).month(month)
    }

    fn series(n: usize) -> Vec<Metric> {
        (0..n)
            .map(|i| Metric {
                day: Some(i as u32 + 1),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_fetch_only_on_change() {
        let mut view = MetricsView::new(query(4), 300);
        assert!(view.begin_fetch(query(4), false).is_none());
        let generation = view.begin_fetch(query(5), false).unwrap();
        assert_eq!(view.load_state(), &LoadState::Loading);
        assert!(view.complete_fetch(generation, Ok(series(3))));
        assert_eq!(view.series().len(), 3);
        assert_eq!(view.load_state(), &LoadState::Ready);
        assert_eq!(view.fetches_issued(), 1);
    }

    #[test]
    fn test_result_replaces_never_merges() {
        let mut view = MetricsView::new(query(4), 300);
        let first = view.begin_fetch(query(4), true).unwrap();
        view.complete_fetch(first, Ok(series(5)));
        let second = view.begin_fetch(query(5), false).unwrap();
        view.complete_fetch(second, Ok(series(2)));
        assert_eq!(view.series().len(), 2);
    }

    #[test]
    fn test_stale_result_is_discarded() {
        let mut view = MetricsView::new(query(4), 300);
        let old = view.begin_fetch(query(5), false).unwrap();
        let new = view.begin_fetch(query(6), false).unwrap();

        assert!(view.complete_fetch(new, Ok(series(1))));
        assert!(!view.complete_fetch(old, Ok(series(9))));
        assert_eq!(view.series().len(), 1);
    }

    #[test]
    fn test_failure_empties_buffer() {
        let mut view = MetricsView::new(query(4), 300);
        let generation = view.begin_fetch(query(4), true).unwrap();
        view.complete_fetch(generation, Ok(series(4)));

        let generation = view.begin_fetch(query(7), false).unwrap();
        view.complete_fetch(generation, Err("API error (500): boom".to_string()));
        assert!(view.series().is_empty());
        assert!(matches!(view.load_state(), LoadState::Failed(msg) if msg.contains("boom")));
    }

    #[test]
    fn test_mode_switch_clears_buffer() {
        let mut view = MetricsView::new(query(4), 2);
        let generation = view.begin_fetch(query(4), true).unwrap();
        view.complete_fetch(generation, Ok(series(5)));

        assert!(view.enter_live());
        assert!(view.series().is_empty());
        assert!(!view.enter_live());

        for m in series(3) {
            assert!(view.push_live(m));
        }
        assert_eq!(view.series().len(), 2);

        // selection changes while live are remembered but not fetched
        assert!(view.begin_fetch(query(9), false).is_none());

        let generation = view.leave_live().unwrap();
        assert!(view.series().is_empty());
        assert_eq!(view.query(), &query(9));
        assert!(!view.push_live(Metric::default()));
        assert!(view.complete_fetch(generation, Ok(series(1))));
    }

    #[test]
    fn test_fetch_landing_after_going_live_is_ignored() {
        let mut view = MetricsView::new(query(4), 300);
        let generation = view.begin_fetch(query(5), false).unwrap();
        view.enter_live();
        assert!(!view.complete_fetch(generation, Ok(series(3))));
        assert!(view.series().is_empty());
    }

    #[test]
    fn test_cell_change_while_live_drops_entries() {
        let mut view = MetricsView::new(query(4), 300);
        view.enter_live();
        view.push_live(Metric::default());

        // same cell, different scope: entries stay
        assert_eq!(view.begin_fetch(query(5), false), None);
        assert_eq!(view.series().len(), 1);

        let other = MetricQuery::new("c2", Scope::Month, 2024).month(5);
        assert_eq!(view.begin_fetch(other, false), None);
        assert!(view.series().is_empty());
        assert_eq!(view.query().cell_id, "c2");
    }
}
