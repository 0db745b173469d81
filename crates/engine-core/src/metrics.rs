use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    records_received: AtomicU64,
    records_written: AtomicU64,
    batches_written: AtomicU64,
    bytes_written: AtomicU64,
    records_dead_lettered: AtomicU64,
    dead_letter_entries: AtomicU64,
    duplicates_dropped: AtomicU64,
    failure_count: AtomicU64,
    retry_count: AtomicU64,
    retrying: AtomicU64,
}

/// Shared pipeline counters. Cloning hands out another view of the same
/// counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub records_received: u64,
    pub records_written: u64,
    pub batches_written: u64,
    pub bytes_written: u64,
    pub records_dead_lettered: u64,
    pub dead_letter_entries: u64,
    /// Redelivered events dropped because their id was already admitted.
    pub duplicates_dropped: u64,
    pub failure_count: u64,
    pub retry_count: u64,
    /// Records currently waiting out a retry backoff.
    pub retrying: u64,
}

impl MetricsSnapshot {
    /// Every received record is written, dead-lettered, dropped as a
    /// duplicate, or still retrying.
    pub fn is_balanced(&self) -> bool {
        self.records_received
            == self.records_written
                + self.records_dead_lettered
                + self.duplicates_dropped
                + self.retrying
    }
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn increment_received(&self, count: u64) {
        self.inner.records_received.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_batch_written(&self, records: u64, bytes: u64) {
        self.inner.records_written.fetch_add(records, Ordering::Relaxed);
        self.inner.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        self.inner.batches_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_letter(&self, records: u64) {
        self.inner
            .records_dead_lettered
            .fetch_add(records, Ordering::Relaxed);
        self.inner.dead_letter_entries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.inner.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failures(&self, count: u64) {
        self.inner.failure_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_retries(&self, count: u64) {
        self.inner.retry_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn enter_retrying(&self, records: u64) {
        self.inner.retrying.fetch_add(records, Ordering::Relaxed);
    }

    pub fn leave_retrying(&self, records: u64) {
        let _ = self
            .inner
            .retrying
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(records))
            });
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_received: self.inner.records_received.load(Ordering::Relaxed),
            records_written: self.inner.records_written.load(Ordering::Relaxed),
            batches_written: self.inner.batches_written.load(Ordering::Relaxed),
            bytes_written: self.inner.bytes_written.load(Ordering::Relaxed),
            records_dead_lettered: self.inner.records_dead_lettered.load(Ordering::Relaxed),
            dead_letter_entries: self.inner.dead_letter_entries.load(Ordering::Relaxed),
            duplicates_dropped: self.inner.duplicates_dropped.load(Ordering::Relaxed),
            failure_count: self.inner.failure_count.load(Ordering::Relaxed),
            retry_count: self.inner.retry_count.load(Ordering::Relaxed),
            retrying: self.inner.retrying.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
