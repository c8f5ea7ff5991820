//! The cached value object and the statistics shapes drivers report.

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::value::QueryResult;

/// Current wall-clock time as Unix seconds.
pub(crate) fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

/// A cached query result together with its bookkeeping fields.
///
/// The payload is never partially updated: after creation the only mutation
/// an entry sees is hit recording, which bumps the counter and the
/// last-accessed timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached result payload.
    pub result: QueryResult,
    /// The originating statement text, kept for diagnostics and stats.
    pub query: String,
    /// Tables this entry depends on; fixed for the entry's lifetime.
    pub tables: BTreeSet<String>,
    /// When the statement finished executing (Unix seconds).
    pub executed_at: u64,
    /// When the entry was written to the store (Unix seconds).
    pub cached_at: u64,
    /// Number of cache hits recorded against this entry.
    pub hits: u64,
    /// When the last hit was recorded, if any (Unix seconds).
    pub last_accessed: Option<u64>,
}

impl CacheEntry {
    /// Create a fresh entry with zero hits, cached now.
    #[must_use]
    pub fn new(
        result: QueryResult,
        query: impl Into<String>,
        tables: BTreeSet<String>,
        executed_at: u64,
    ) -> Self {
        Self {
            result,
            query: query.into(),
            tables,
            executed_at,
            cached_at: now_unix(),
            hits: 0,
            last_accessed: None,
        }
    }

    /// Record one cache hit: bump the counter, refresh the access time.
    pub fn record_hit(&mut self) {
        self.hits += 1;
        self.last_accessed = Some(now_unix());
    }

    /// Produce the per-entry summary reported by `stats()`.
    #[must_use]
    pub fn summary(&self, key: &str) -> EntrySummary {
        EntrySummary {
            key: key.to_string(),
            query: self.query.clone(),
            tables: self.tables.clone(),
            hits: self.hits,
            cached_at: self.cached_at,
            last_accessed: self.last_accessed,
        }
    }
}

/// Per-entry line item in a stats report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySummary {
    /// The entry's cache key.
    pub key: String,
    /// The originating statement text.
    pub query: String,
    /// Tables the entry depends on.
    pub tables: BTreeSet<String>,
    /// Hits recorded against the entry.
    pub hits: u64,
    /// When the entry was cached (Unix seconds).
    pub cached_at: u64,
    /// When the entry was last hit, if ever (Unix seconds).
    pub last_accessed: Option<u64>,
}

/// Aggregate statistics for one store driver.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    /// Name of the driver reporting ("memory", "redis", "null").
    pub driver: String,
    /// Number of entries currently resident.
    pub cached_count: usize,
    /// Sum of hit counters across resident entries.
    pub total_hits: u64,
    /// Per-entry summaries, in stable key order.
    pub entries: Vec<EntrySummary>,
}

impl StoreStats {
    /// An empty report for the named driver.
    #[must_use]
    pub fn empty(driver: impl Into<String>) -> Self {
        Self { driver: driver.into(), ..Self::default() }
    }
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} store: {} entries, {} total hits",
            self.driver, self.cached_count, self.total_hits
        )
    }
}
