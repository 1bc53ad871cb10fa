//! Per-stage metrics.
//!
//! [`StageMetrics`] holds lock-free counters updated by a running stage;
//! [`StageMetricsSnapshot`] is a plain copy for reporting.
//!
//! | Counter | Reader | Writer |
//! |---|---|---|
//! | `records_received` | records polled | events taken from upstream |
//! | `records_delivered` | values forwarded | destination writes |
//! | `commits` | source offsets committed | `Commit` decisions sent |
//! | `no_commits` | `NoCommit` decisions received | `NoCommit` decisions sent |
//! | `errors` | poll/commit/channel failures | transform/write/channel failures |

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for one stage.
#[derive(Debug, Default)]
pub struct StageMetrics {
    /// Records taken in by the stage.
    pub records_received: AtomicU64,

    /// Records handed on by the stage.
    pub records_delivered: AtomicU64,

    /// Commits performed (reader) or requested (writer).
    pub commits: AtomicU64,

    /// `NoCommit` decisions seen (reader) or sent (writer).
    pub no_commits: AtomicU64,

    /// Failures that ended or interrupted the loop.
    pub errors: AtomicU64,
}

impl StageMetrics {
    /// Creates a new metrics instance with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a record taken in.
    pub fn record_received(&self) {
        self.records_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a record handed on.
    pub fn record_delivered(&self) {
        self.records_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a commit.
    pub fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a `NoCommit`.
    pub fn record_no_commit(&self) {
        self.no_commits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failure.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of the current counters.
    #[must_use]
    pub fn snapshot(&self) -> StageMetricsSnapshot {
        StageMetricsSnapshot {
            records_received: self.records_received.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            no_commits: self.no_commits.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`StageMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageMetricsSnapshot {
    /// Records taken in.
    pub records_received: u64,
    /// Records handed on.
    pub records_delivered: u64,
    /// Commits.
    pub commits: u64,
    /// `NoCommit` decisions.
    pub no_commits: u64,
    /// Failures.
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_zeros() {
        assert_eq!(StageMetrics::new().snapshot(), StageMetricsSnapshot::default());
    }

    #[test]
    fn test_counters() {
        let m = StageMetrics::new();
        m.record_received();
        m.record_received();
        m.record_delivered();
        m.record_commit();
        m.record_no_commit();
        m.record_error();

        let snap = m.snapshot();
        assert_eq!(snap.records_received, 2);
        assert_eq!(snap.records_delivered, 1);
        assert_eq!(snap.commits, 1);
        assert_eq!(snap.no_commits, 1);
        assert_eq!(snap.errors, 1);
    }
}
