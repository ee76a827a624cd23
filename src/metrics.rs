//! Passive fetch/persist counters, reported once at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Shared metrics collector
///
/// All counters are relaxed atomics: fetch tasks update them concurrently and
/// nothing reads them until every stage has completed, so no ordering beyond
/// the final join is required.
#[derive(Debug, Default)]
pub struct Metrics {
    attempted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    persisted: AtomicU64,
    persist_failed: AtomicU64,
    bytes_fetched: AtomicU64,
    fetch_millis: AtomicU64,
}

/// Point-in-time copy of every counter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Fetches started
    pub attempted: u64,
    /// Fetches that returned a success-status body
    pub succeeded: u64,
    /// Fetches that failed for a reason other than cancellation
    pub failed: u64,
    /// Fetches abandoned because the cancellation token fired
    pub dropped: u64,
    /// Results durably written by the sink
    pub persisted: u64,
    /// Results the sink failed to write
    pub persist_failed: u64,
    /// Total response-body bytes fetched
    pub bytes_fetched: u64,
    /// Cumulative wall-clock fetch time in milliseconds
    pub fetch_millis: u64,
}

impl Metrics {
    /// Create a collector with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a fetch has started.
    pub fn record_attempt(&self) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful fetch of `bytes` bytes taking `elapsed`.
    pub fn record_success(&self, bytes: u64, elapsed: Duration) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.bytes_fetched.fetch_add(bytes, Ordering::Relaxed);
        self.fetch_millis
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record a fetch that failed for a non-cancellation reason.
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fetch abandoned due to shutdown.
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one result durably persisted by the sink.
    pub fn record_persisted(&self) {
        self.persisted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one result the sink could not persist.
    pub fn record_persist_failure(&self) {
        self.persist_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attempted: self.attempted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            persist_failed: self.persist_failed.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
            fetch_millis: self.fetch_millis.load(Ordering::Relaxed),
        }
    }

    /// Emit the final summary. Called exactly once, after all stages complete.
    pub fn report(&self) {
        let s = self.snapshot();
        tracing::info!(
            attempted = s.attempted,
            succeeded = s.succeeded,
            failed = s.failed,
            dropped = s.dropped,
            persisted = s.persisted,
            persist_failed = s.persist_failed,
            bytes_fetched = s.bytes_fetched,
            total_fetch_millis = s.fetch_millis,
            "fetch run complete"
        );
    }
}
