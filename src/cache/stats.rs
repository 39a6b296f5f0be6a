//! Cache Statistics Module
//!
//! Tracks hits, misses and evictions per reason.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::cache::EvictionReason;

// == Cache Stats ==
/// Point-in-time snapshot of cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed retrievals (absent or evicted on access)
    pub misses: u64,
    /// Total number of evictions, all reasons combined
    pub evictions: u64,
    /// Evictions caused by explicit removal
    pub removed: u64,
    /// Evictions caused by a newer entry under the same key
    pub replaced: u64,
    /// Evictions caused by a lazy trigger reporting expired
    pub expired: u64,
    /// Evictions caused by an active trigger callback
    pub trigger_fired: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Stats Counters ==
/// Lock-free counters updated by the store from any thread.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    removed: AtomicU64,
    replaced: AtomicU64,
    expired: AtomicU64,
    trigger_fired: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self, reason: EvictionReason) {
        let counter = match reason {
            EvictionReason::Removed => &self.removed,
            EvictionReason::Replaced => &self.replaced,
            EvictionReason::Expired => &self.expired,
            EvictionReason::TriggerFired => &self.trigger_fired,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, total_entries: usize) -> CacheStats {
        let removed = self.removed.load(Ordering::Relaxed);
        let replaced = self.replaced.load(Ordering::Relaxed);
        let expired = self.expired.load(Ordering::Relaxed);
        let trigger_fired = self.trigger_fired.load(Ordering::Relaxed);

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: removed + replaced + expired + trigger_fired,
            removed,
            replaced,
            expired,
            trigger_fired,
            total_entries,
        }
    }
}
