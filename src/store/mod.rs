//! Store drivers and the contract they implement.
//!
//! Three drivers exist: [`MemoryStore`] (bounded, in-process, LRU-evicted),
//! [`RedisStore`] (two-tier: per-unit-of-work L1 in front of Redis), and
//! [`NullStore`] (always-miss no-op). The façade owns exactly one of them,
//! injected at construction via [`Store::from_config`]; drivers are plain
//! values, never process globals.
//!
//! [`Store`] is the closed set of driver variants with static dispatch; the
//! [`CacheStore`] trait is the shared contract. Driver methods return
//! `Result` and leave the fail-open policy to the façade, so the drivers
//! themselves stay honest about failures.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::warn;

use crate::config::CacheConfig;
use crate::entry::{CacheEntry, StoreStats};
use crate::error::{CacheError, Result};
use crate::metrics::CacheMetrics;
use crate::value::QueryResult;

mod codec;
mod memory;
mod null;
mod redis;

pub use memory::MemoryStore;
pub use null::NullStore;
pub use redis::RedisStore;

/// The store driver contract.
///
/// All methods take `&self`; drivers synchronize internally (§ concurrency
/// notes on each implementation).
pub trait CacheStore {
    /// Driver name as reported in stats ("memory", "redis", "null").
    fn name(&self) -> &'static str;

    /// Look up an entry. No recency side effect: recency and hit counting
    /// happen only through [`CacheStore::record_hit`], so fetching an entry
    /// for inspection is distinguishable from using it as a hit.
    fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Store a result under `key`, deriving the statement's table set for
    /// the invalidation index.
    fn put(&self, key: &str, result: QueryResult, sql: &str, executed_at: u64) -> Result<()>;

    /// Whether an entry currently exists for `key`.
    fn has(&self, key: &str) -> Result<bool>;

    /// Remove one entry and its index memberships.
    fn forget(&self, key: &str) -> Result<()>;

    /// Remove every entry depending on any of `tables` and return the count
    /// removed. An empty `tables` set means the affected tables are unknown:
    /// the entire store is cleared (the conservative fallback).
    fn invalidate_tables(&self, tables: &BTreeSet<String>, triggering_sql: &str) -> Result<u64>;

    /// Remove everything.
    fn flush(&self) -> Result<()>;

    /// Aggregate statistics plus per-entry summaries.
    fn stats(&self) -> Result<StoreStats>;

    /// Record a cache hit against `key`: bump its hit counter and refresh
    /// its last-accessed time. No-op if the key is absent.
    fn record_hit(&self, key: &str) -> Result<()>;

    /// All live keys.
    fn all_keys(&self) -> Result<Vec<String>>;

    /// Mark a unit-of-work boundary. The two-tier driver clears its L1 map
    /// here; other drivers have nothing local to reset.
    fn reset_local(&self) {}
}

/// The closed set of store drivers.
#[derive(Debug)]
pub enum Store {
    /// Bounded in-process store.
    Memory(MemoryStore),
    /// Two-tier persistent store.
    Redis(RedisStore),
    /// Always-miss no-op store.
    Null(NullStore),
}

impl Store {
    /// Resolve a driver from configuration.
    ///
    /// Construction never fails: an unknown driver name or an unusable
    /// remote-tier identifier resolves to the null store with a logged
    /// warning, per the fail-open posture.
    #[must_use]
    pub fn from_config(config: &CacheConfig, metrics: &Arc<CacheMetrics>) -> Self {
        match config.driver.as_str() {
            "memory" => {
                Self::Memory(MemoryStore::new(config.max_entries, config.logging, metrics))
            }
            "redis" => match RedisStore::new(config) {
                Ok(store) => Self::Redis(store),
                Err(err) => {
                    warn!("cache driver 'redis' unavailable ({err}), falling back to null store");
                    Self::Null(NullStore::new())
                }
            },
            "null" => Self::Null(NullStore::new()),
            other => {
                let err = CacheError::config(format!("unknown cache driver '{other}'"));
                warn!("{err}, falling back to null store");
                Self::Null(NullStore::new())
            }
        }
    }
}

impl CacheStore for Store {
    fn name(&self) -> &'static str {
        match self {
            Self::Memory(s) => s.name(),
            Self::Redis(s) => s.name(),
            Self::Null(s) => s.name(),
        }
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        match self {
            Self::Memory(s) => s.get(key),
            Self::Redis(s) => s.get(key),
            Self::Null(s) => s.get(key),
        }
    }

    fn put(&self, key: &str, result: QueryResult, sql: &str, executed_at: u64) -> Result<()> {
        match self {
            Self::Memory(s) => s.put(key, result, sql, executed_at),
            Self::Redis(s) => s.put(key, result, sql, executed_at),
            Self::Null(s) => s.put(key, result, sql, executed_at),
        }
    }

    fn has(&self, key: &str) -> Result<bool> {
        match self {
            Self::Memory(s) => s.has(key),
            Self::Redis(s) => s.has(key),
            Self::Null(s) => s.has(key),
        }
    }

    fn forget(&self, key: &str) -> Result<()> {
        match self {
            Self::Memory(s) => s.forget(key),
            Self::Redis(s) => s.forget(key),
            Self::Null(s) => s.forget(key),
        }
    }

    fn invalidate_tables(&self, tables: &BTreeSet<String>, triggering_sql: &str) -> Result<u64> {
        match self {
            Self::Memory(s) => s.invalidate_tables(tables, triggering_sql),
            Self::Redis(s) => s.invalidate_tables(tables, triggering_sql),
            Self::Null(s) => s.invalidate_tables(tables, triggering_sql),
        }
    }

    fn flush(&self) -> Result<()> {
        match self {
            Self::Memory(s) => s.flush(),
            Self::Redis(s) => s.flush(),
            Self::Null(s) => s.flush(),
        }
    }

    fn stats(&self) -> Result<StoreStats> {
        match self {
            Self::Memory(s) => s.stats(),
            Self::Redis(s) => s.stats(),
            Self::Null(s) => s.stats(),
        }
    }

    fn record_hit(&self, key: &str) -> Result<()> {
        match self {
            Self::Memory(s) => s.record_hit(key),
            Self::Redis(s) => s.record_hit(key),
            Self::Null(s) => s.record_hit(key),
        }
    }

    fn all_keys(&self) -> Result<Vec<String>> {
        match self {
            Self::Memory(s) => s.all_keys(),
            Self::Redis(s) => s.all_keys(),
            Self::Null(s) => s.all_keys(),
        }
    }

    fn reset_local(&self) {
        match self {
            Self::Memory(s) => s.reset_local(),
            Self::Redis(s) => s.reset_local(),
            Self::Null(s) => s.reset_local(),
        }
    }
}
