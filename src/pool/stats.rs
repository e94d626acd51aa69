//! Pool statistics
//!
//! Lock-free counters describing what a pool has done over its lifetime.

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Statistics for a connection pool
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Connections constructed
    pub total_created: AtomicUsize,
    /// Successful acquisitions
    pub total_acquired: AtomicUsize,
    /// Acquisitions served from the idle set
    pub total_reused: AtomicUsize,
    /// Healthy connections put back
    pub total_returned: AtomicUsize,
    /// Connections dropped as unhealthy or detached
    pub total_discarded: AtomicUsize,
    /// Acquisitions that hit their deadline
    pub total_timeouts: AtomicUsize,
    /// Forced verifications that failed
    pub total_verify_failures: AtomicUsize,
}

impl PoolStats {
    /// Create new pool stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection construction
    pub fn record_created(&self) {
        self.total_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an acquisition; `reused` when served from the idle set
    pub fn record_acquired(&self, reused: bool) {
        self.total_acquired.fetch_add(1, Ordering::Relaxed);
        if reused {
            self.total_reused.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a healthy return
    pub fn record_returned(&self) {
        self.total_returned.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a discarded connection
    pub fn record_discarded(&self) {
        self.total_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an acquire timeout
    pub fn record_timeout(&self) {
        self.total_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed forced verification
    pub fn record_verify_failure(&self) {
        self.total_verify_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current stats snapshot
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            total_created: self.total_created.load(Ordering::Relaxed),
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_reused: self.total_reused.load(Ordering::Relaxed),
            total_returned: self.total_returned.load(Ordering::Relaxed),
            total_discarded: self.total_discarded.load(Ordering::Relaxed),
            total_timeouts: self.total_timeouts.load(Ordering::Relaxed),
            total_verify_failures: self.total_verify_failures.load(Ordering::Relaxed),
        }
    }

    /// Log the counters for `address`
    pub fn log(&self, address: &str) {
        let stats = self.snapshot();
        debug!(
            "Pool {} stats: created={}, acquired={}, reused={}, returned={}, discarded={}, timeouts={}, verify_failures={}",
            address,
            stats.total_created,
            stats.total_acquired,
            stats.total_reused,
            stats.total_returned,
            stats.total_discarded,
            stats.total_timeouts,
            stats.total_verify_failures
        );
    }
}

/// Snapshot of pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct PoolStatsSnapshot {
    pub total_created: usize,
    pub total_acquired: usize,
    pub total_reused: usize,
    pub total_returned: usize,
    pub total_discarded: usize,
    pub total_timeouts: usize,
    pub total_verify_failures: usize,
}
