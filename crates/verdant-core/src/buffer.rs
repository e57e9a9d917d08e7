//! Bounded series buffer for live telemetry.

use std::collections::VecDeque;
use std::collections::vec_deque;

use verdant_types::Metric;

use crate::options::DEFAULT_BUFFER_CAPACITY;

/// Ring buffer of metrics in arrival order.
///
/// Pushing past capacity evicts the oldest entry. Replacing the contents
/// (for a historical series) is not bounded.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricBuffer {
    entries: VecDeque<Metric>,
    capacity: usize,
}

impl Default for MetricBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

impl MetricBuffer {
    /// Buffer holding at most `capacity` live entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append, evicting the oldest entries beyond capacity.
    ///
    /// Returns the number of evicted entries.
    pub fn push(&mut self, metric: Metric) -> usize {
        self.entries.push_back(metric);
        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Replace the whole contents.
    pub fn replace(&mut self, series: Vec<Metric>) {
        self.entries = series.into();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Most recent entry.
    pub fn latest(&self) -> Option<&Metric> {
        self.entries.back()
    }

    /// Entry before the most recent one.
    pub fn previous(&self) -> Option<&Metric> {
        self.entries.len().checked_sub(2).and_then(|i| self.entries.get(i))
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, Metric> {
        self.entries.iter()
    }

    /// Snapshot in arrival order.
    pub fn to_vec(&self) -> Vec<Metric> {
        self.entries.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a MetricBuffer {
    type Item = &'a Metric;
    type IntoIter = vec_deque::Iter<'a, Metric>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
