//! Per-cell counters
//!
//! - Counters are monotonic; `subscribers_live` is a gauge
//! - One registry per cell, reset when the cell is built
//! - Relaxed atomics; readers may see a slightly stale total

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for one cell
#[derive(Debug, Default)]
pub struct CellMetrics {
    /// Successful commits, including init-time ones
    commits: AtomicU64,
    /// Payload bytes handed to the atomic store
    bytes_written: AtomicU64,
    /// Transforms that returned an error
    transform_failures: AtomicU64,
    /// Updates whose caller left before they ran
    updates_cancelled: AtomicU64,
    /// Updates that produced an equal value and were skipped
    updates_unchanged: AtomicU64,
    /// Corrupt payloads replaced by the handler
    corruption_recoveries: AtomicU64,
    /// Migrations that ran
    migrations_applied: AtomicU64,
    /// Subscriptions ever attached
    subscribers_attached: AtomicU64,
    /// Subscriptions currently receiving commits
    subscribers_live: AtomicU64,
}

impl CellMetrics {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a commit of `bytes` payload bytes
    pub fn record_commit(&self, bytes: u64) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_transform_failures(&self) {
        self.transform_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_updates_cancelled(&self) {
        self.updates_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_updates_unchanged(&self) {
        self.updates_unchanged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_corruption_recoveries(&self) {
        self.corruption_recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_migrations_applied(&self, count: u64) {
        self.migrations_applied.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_subscribers(&self) {
        self.subscribers_attached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_subscribers_live(&self, live: usize) {
        self.subscribers_live.store(live as u64, Ordering::Relaxed);
    }

    /// Number of commits so far
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Current counters as a JSON object
    pub fn to_json(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"{{"commits":{},"bytes_written":{},"transform_failures":{},"updates_cancelled":{},"updates_unchanged":{},"corruption_recoveries":{},"migrations_applied":{},"subscribers_attached":{},"subscribers_live":{}}}"#,
            s.commits,
            s.bytes_written,
            s.transform_failures,
            s.updates_cancelled,
            s.updates_unchanged,
            s.corruption_recoveries,
            s.migrations_applied,
            s.subscribers_attached,
            s.subscribers_live,
        )
    }

    /// Get all counters as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            commits: self.commits.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            transform_failures: self.transform_failures.load(Ordering::Relaxed),
            updates_cancelled: self.updates_cancelled.load(Ordering::Relaxed),
            updates_unchanged: self.updates_unchanged.load(Ordering::Relaxed),
            corruption_recoveries: self.corruption_recoveries.load(Ordering::Relaxed),
            migrations_applied: self.migrations_applied.load(Ordering::Relaxed),
            subscribers_attached: self.subscribers_attached.load(Ordering::Relaxed),
            subscribers_live: self.subscribers_live.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of a cell's counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub commits: u64,
    pub bytes_written: u64,
    pub transform_failures: u64,
    pub updates_cancelled: u64,
    pub updates_unchanged: u64,
    pub corruption_recoveries: u64,
    pub migrations_applied: u64,
    pub subscribers_attached: u64,
    pub subscribers_live: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        assert_eq!(CellMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_record_commit() {
        let metrics = CellMetrics::new();
        metrics.record_commit(100);
        metrics.record_commit(50);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.commits, 2);
        assert_eq!(snapshot.bytes_written, 150);
        assert_eq!(metrics.commits(), 2);
    }

    #[test]
    fn test_increment_counters() {
        let metrics = CellMetrics::new();
        metrics.increment_transform_failures();
        metrics.increment_updates_cancelled();
        metrics.increment_updates_unchanged();
        metrics.increment_corruption_recoveries();
        metrics.add_migrations_applied(3);
        metrics.increment_subscribers();
        metrics.increment_subscribers();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.transform_failures, 1);
        assert_eq!(snapshot.updates_cancelled, 1);
        assert_eq!(snapshot.updates_unchanged, 1);
        assert_eq!(snapshot.corruption_recoveries, 1);
        assert_eq!(snapshot.migrations_applied, 3);
        assert_eq!(snapshot.subscribers_attached, 2);
    }

    #[test]
    fn test_subscribers_live_is_a_gauge() {
        let metrics = CellMetrics::new();
        metrics.set_subscribers_live(3);
        metrics.set_subscribers_live(1);

        assert_eq!(metrics.snapshot().subscribers_live, 1);
        let parsed: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(parsed["subscribers_live"], 1);
    }

    #[test]
    fn test_to_json() {
        let metrics = CellMetrics::new();
        metrics.record_commit(1234);
        metrics.increment_subscribers();

        let parsed: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(parsed["commits"], 1);
        assert_eq!(parsed["bytes_written"], 1234);
        assert_eq!(parsed["subscribers_attached"], 1);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(CellMetrics::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let m = Arc::clone(&metrics);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    m.record_commit(1);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.snapshot().commits, 1000);
        assert_eq!(metrics.snapshot().bytes_written, 1000);
    }
}
