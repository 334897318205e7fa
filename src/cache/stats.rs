//! Per-cache hit and miss accounting.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters updated on every cache operation.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses_not_found: AtomicU64,
    misses_expired: AtomicU64,
    misses_soft_ref: AtomicU64,
    remove_hits: AtomicU64,
    remove_misses: AtomicU64,
}

impl CacheStats {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss_not_found(&self) {
        self.misses_not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss_expired(&self) {
        self.misses_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss_soft_ref(&self) {
        self.misses_soft_ref.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_remove_hit(&self) {
        self.remove_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_remove_miss(&self) {
        self.remove_misses.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses_not_found: self.misses_not_found.load(Ordering::Relaxed),
            misses_expired: self.misses_expired.load(Ordering::Relaxed),
            misses_soft_ref: self.misses_soft_ref.load(Ordering::Relaxed),
            remove_hits: self.remove_hits.load(Ordering::Relaxed),
            remove_misses: self.remove_misses.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counter values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses_not_found: u64,
    pub misses_expired: u64,
    pub misses_soft_ref: u64,
    pub remove_hits: u64,
    pub remove_misses: u64,
}

impl CacheStatsSnapshot {
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses_not_found + self.misses_expired + self.misses_soft_ref
    }
}
