use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    records_fetched: AtomicU64,
    rows_written: AtomicU64,
    batches_written: AtomicU64,
    files_written: AtomicU64,
    files_skipped: AtomicU64,
    bytes_written: AtomicU64,
}

/// Run counters shared by the fetch and write stages; logged when the run ends.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub records_fetched: u64,
    pub rows_written: u64,
    pub batches_written: u64,
    pub files_written: u64,
    pub files_skipped: u64,
    pub bytes_written: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn increment_fetched(&self, count: u64) {
        self.inner.records_fetched.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_rows(&self, count: u64) {
        self.inner.rows_written.fetch_add(count, Ordering::Relaxed);
        self.inner.batches_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_files(&self, bytes: u64) {
        self.inner.files_written.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_skipped(&self) {
        self.inner.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_fetched: self.inner.records_fetched.load(Ordering::Relaxed),
            rows_written: self.inner.rows_written.load(Ordering::Relaxed),
            batches_written: self.inner.batches_written.load(Ordering::Relaxed),
            files_written: self.inner.files_written.load(Ordering::Relaxed),
            files_skipped: self.inner.files_skipped.load(Ordering::Relaxed),
            bytes_written: self.inner.bytes_written.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let metrics = Metrics::new();
        let other = metrics.clone();
        other.increment_rows(10);
        other.increment_rows(5);
        metrics.increment_files(128);
        metrics.increment_skipped();

        let snap = metrics.snapshot();
        assert_eq!(snap.rows_written, 15);
        assert_eq!(snap.batches_written, 2);
        assert_eq!(snap.files_written, 1);
        assert_eq!(snap.bytes_written, 128);
        assert_eq!(snap.files_skipped, 1);
    }
}
