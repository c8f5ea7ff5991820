//! Engine traffic counters.
//!
//! These are process-local atomics describing what the façade did (hits,
//! misses, writes, invalidations, swallowed store errors). They are distinct
//! from `statistics()`, which reflects what the store currently holds:
//! metrics survive invalidation and flushes.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for cache engine activity.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Number of reads served from the cache.
    hits: AtomicU64,
    /// Number of reads that fell through to execution.
    misses: AtomicU64,
    /// Number of results written to the store.
    puts: AtomicU64,
    /// Number of entries evicted by the bounded store's LRU policy.
    evictions: AtomicU64,
    /// Number of entries invalidated by writes.
    invalidations: AtomicU64,
    /// Number of store errors swallowed by the fail-open policy.
    store_errors: AtomicU64,
}

impl CacheMetrics {
    /// Create a zeroed metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cache hit.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a store write.
    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record LRU evictions.
    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record invalidations due to writes.
    pub fn record_invalidations(&self, count: u64) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a store error that was swallowed by the fail-open policy.
    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of cache hits so far.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of cache misses so far.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of store writes so far.
    #[must_use]
    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    /// Number of entries evicted for capacity so far.
    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Number of entries removed by write invalidation so far.
    #[must_use]
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    /// Number of swallowed store errors so far.
    #[must_use]
    pub fn store_errors(&self) -> u64 {
        self.store_errors.load(Ordering::Relaxed)
    }

    /// Total lookups (hits + misses).
    #[must_use]
    pub fn total_lookups(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Hit rate as a percentage, or `None` before the first lookup.
    #[must_use]
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.total_lookups();
        if total == 0 {
            None
        } else {
            Some((self.hits() as f64 / total as f64) * 100.0)
        }
    }

    /// Reset every counter to zero.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.puts.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
        self.store_errors.store(0, Ordering::Relaxed);
    }

    /// Point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            puts: self.puts(),
            evictions: self.evictions(),
            invalidations: self.invalidations(),
            store_errors: self.store_errors(),
        }
    }
}

/// A point-in-time copy of [`CacheMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of store writes.
    pub puts: u64,
    /// Number of LRU evictions.
    pub evictions: u64,
    /// Number of invalidations.
    pub invalidations: u64,
    /// Number of swallowed store errors.
    pub store_errors: u64,
}

impl MetricsSnapshot {
    /// Total lookups (hits + misses).
    #[must_use]
    pub fn total_lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Hit rate as a percentage, or `None` before the first lookup.
    #[must_use]
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.total_lookups();
        if total == 0 {
            None
        } else {
            Some((self.hits as f64 / total as f64) * 100.0)
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hit_rate =
            self.hit_rate().map_or_else(|| "n/a".to_string(), |r| format!("{r:.1}%"));
        write!(
            f,
            "cache: hits={}, misses={}, hit_rate={}, puts={}, evictions={}, invalidations={}, store_errors={}",
            self.hits, self.misses, hit_rate, self.puts, self.evictions, self.invalidations,
            self.store_errors
        )
    }
}
