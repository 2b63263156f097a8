//! Observability hook called by the engine at well-defined points.
//!
//! The engine always emits `tracing` events; an observer is for callers that
//! want the same signals as data (metrics sinks, tests, dashboards).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::engine::SweepReport;
use super::key::RequestKey;
use crate::http::StatusCode;

/// Receives cache lifecycle signals. Every method defaults to a no-op.
pub trait CacheObserver: Send + Sync {
    /// A fresh entry was served without touching the network.
    fn on_hit(&self, _key: &RequestKey) {}

    /// No entry existed for the request.
    fn on_miss(&self, _key: &RequestKey) {}

    /// An entry was found stale at lookup and deleted. `expires_at` is `None`
    /// when the entry carried no usable stamp.
    fn on_expired(&self, _key: &RequestKey, _expires_at: Option<u64>) {}

    fn on_stored(&self, _key: &RequestKey, _expires_at: u64) {}

    /// A fetched response was returned but deliberately not cached.
    fn on_not_stored(&self, _key: &RequestKey, _status: StatusCode) {}

    fn on_sweep(&self, _report: &SweepReport) {}

    /// A store belonging to another engine version was removed at activation.
    fn on_store_deleted(&self, _name: &str) {}
}

/// Counts every signal with relaxed atomics.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    stored: AtomicU64,
    not_stored: AtomicU64,
    swept: AtomicU64,
    stores_deleted: AtomicU64,
}

/// A point-in-time copy of [`CacheStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub stored: u64,
    pub not_stored: u64,
    pub swept: u64,
    pub stores_deleted: u64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            not_stored: self.not_stored.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
            stores_deleted: self.stores_deleted.load(Ordering::Relaxed),
        }
    }
}

impl CacheObserver for CacheStats {
    fn on_hit(&self, _key: &RequestKey) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn on_miss(&self, _key: &RequestKey) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn on_expired(&self, _key: &RequestKey, _expires_at: Option<u64>) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }

    fn on_stored(&self, _key: &RequestKey, _expires_at: u64) {
        self.stored.fetch_add(1, Ordering::Relaxed);
    }

    fn on_not_stored(&self, _key: &RequestKey, _status: StatusCode) {
        self.not_stored.fetch_add(1, Ordering::Relaxed);
    }

    fn on_sweep(&self, report: &SweepReport) {
        self.swept.fetch_add(report.removed as u64, Ordering::Relaxed);
    }

    fn on_store_deleted(&self, _name: &str) {
        self.stores_deleted.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_count_every_signal() {
        let stats = CacheStats::new();
        let key = RequestKey::new("GET", "http://example.com/a.png");

        stats.on_miss(&key);
        stats.on_stored(&key, 10);
        stats.on_hit(&key);
        stats.on_hit(&key);
        stats.on_expired(&key, None);
        stats.on_not_stored(&key, StatusCode::NOT_MODIFIED);
        stats.on_store_deleted("image-cache-v0");
        stats.on_sweep(&SweepReport {
            scanned: 4,
            removed: 3,
            failed: 1,
        });

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                hits: 2,
                misses: 1,
                expired: 1,
                stored: 1,
                not_stored: 1,
                swept: 3,
                stores_deleted: 1,
            }
        );
    }

    #[test]
    fn default_hooks_do_nothing() {
        struct Silent;
        impl CacheObserver for Silent {}

        let key = RequestKey::new("GET", "http://example.com/a.png");
        Silent.on_hit(&key);
        Silent.on_sweep(&SweepReport::default());
    }
}
