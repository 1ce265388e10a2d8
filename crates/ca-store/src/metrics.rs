//! Counters for the authority cache.
//!
//! All atomics use `Ordering::Relaxed`. Each counter is independent and
//! only ever incremented, so a snapshot may be momentarily inconsistent
//! across counters but never tears a single value.
//!
//! # Usage
//!
//! ```
//! use trustgate_ca_store::CacheMetrics;
//!
//! let metrics = CacheMetrics::new();
//! metrics.record_applied();
//! metrics.record_suppressed();
//! metrics.record_suppressed();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.applied, 1);
//! assert_eq!(snapshot.suppressed, 2);
//! assert!((snapshot.suppression_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`CacheMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bon::Builder)]
pub struct CacheMetricsSnapshot {
    /// Updates that changed the cached view.
    #[builder(default)]
    pub applied: u64,
    /// Updates skipped because they were equivalent to the cached copy.
    #[builder(default)]
    pub suppressed: u64,
    /// Deletions that removed a cached authority.
    #[builder(default)]
    pub deleted: u64,
    /// Full reconciliations against a store snapshot.
    #[builder(default)]
    pub reconciles: u64,
    /// Times the event stream lagged and events were lost.
    #[builder(default)]
    pub lagged: u64,
    /// Trust pools built from the cache.
    #[builder(default)]
    pub pools_built: u64,
}

impl CacheMetricsSnapshot {
    /// Share of put updates that were suppressed, or `0.0` when none were
    /// seen.
    #[must_use]
    pub fn suppression_rate(&self) -> f64 {
        let total = self.applied + self.suppressed;
        if total == 0 {
            return 0.0;
        }
        self.suppressed as f64 / total as f64
    }
}

/// Lock-free counters updated by [`CertAuthorityCache`](crate::CertAuthorityCache).
#[derive(Debug, Default)]
pub struct CacheMetrics {
    applied: AtomicU64,
    suppressed: AtomicU64,
    deleted: AtomicU64,
    reconciles: AtomicU64,
    lagged: AtomicU64,
    pools_built: AtomicU64,
}

impl CacheMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an update that changed the cached view.
    pub fn record_applied(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an update suppressed as equivalent.
    pub fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a removal.
    pub fn record_deleted(&self) {
        self.deleted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a full reconciliation.
    pub fn record_reconcile(&self) {
        self.reconciles.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a lagged event stream.
    pub fn record_lagged(&self) {
        self.lagged.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a trust pool build.
    pub fn record_pool_built(&self) {
        self.pools_built.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            applied: self.applied.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            reconciles: self.reconciles.load(Ordering::Relaxed),
            lagged: self.lagged.load(Ordering::Relaxed),
            pools_built: self.pools_built.load(Ordering::Relaxed),
        }
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        for counter in [
            &self.applied,
            &self.suppressed,
            &self.deleted,
            &self.reconciles,
            &self.lagged,
            &self.pools_built,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
