//! The cache façade wired between application code and a database driver.
//!
//! [`CacheEngine`] owns one injected store driver plus the fingerprint and
//! table-extraction memos, and applies the fail-open policy: a store that
//! errors degrades the cache to a pass-through, it never breaks the
//! caller's query. Errors from the caller's own execute closure pass
//! through untouched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error};

use crate::config::CacheConfig;
use crate::entry::{now_unix, StoreStats};
use crate::error::CacheError;
use crate::fingerprint::Fingerprinter;
use crate::hints::{extract_cache_hint, CacheHint};
use crate::metrics::CacheMetrics;
use crate::store::{CacheStore, Store};
use crate::tables::TableExtractor;
use crate::value::{QueryResult, Value};

/// Query-result cache façade.
///
/// One engine serves one database handle. Reads go through
/// [`CacheEngine::fetch`], writes announce themselves through
/// [`CacheEngine::notify_write`], and the engine keeps cached results
/// consistent by invalidating everything a write could have touched.
pub struct CacheEngine {
    store: Store,
    fingerprinter: Fingerprinter,
    extractor: TableExtractor,
    metrics: Arc<CacheMetrics>,
    enabled: AtomicBool,
    log: bool,
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("store", &self.store)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl CacheEngine {
    /// Build an engine with the driver the configuration names.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let metrics = Arc::new(CacheMetrics::new());
        let store = Store::from_config(&config, &metrics);
        Self {
            store,
            fingerprinter: Fingerprinter::new(),
            extractor: TableExtractor::new(),
            metrics,
            enabled: AtomicBool::new(config.enabled),
            log: config.logging,
        }
    }

    /// Run a read through the cache.
    ///
    /// On a hit the cached result comes back and `execute` never runs. On
    /// a miss `execute` produces the result, which is stored before being
    /// returned. Store failures are logged and swallowed; errors from
    /// `execute` propagate unchanged.
    ///
    /// A leading `/*+ CACHE */` or `/*+ NO_CACHE */` comment overrides the
    /// engine's enabled state for this statement and is stripped before
    /// the statement is fingerprinted.
    ///
    /// ```
    /// use relcache::{params, CacheConfig, CacheEngine, QueryResult};
    ///
    /// let engine = CacheEngine::new(CacheConfig::new());
    /// let result = engine.fetch("SELECT name FROM users WHERE id = ?", &params!(7), || {
    ///     Ok::<_, std::io::Error>(QueryResult::new(
    ///         vec!["name".to_string()],
    ///         vec![vec!["ada".into()]],
    ///     ))
    /// })?;
    /// assert_eq!(result.len(), 1);
    /// # Ok::<(), std::io::Error>(())
    /// ```
    pub fn fetch<E>(
        &self,
        sql: &str,
        params: &[Value],
        execute: impl FnOnce() -> Result<QueryResult, E>,
    ) -> Result<QueryResult, E> {
        let (hint, sql) = extract_cache_hint(sql);
        let use_cache = match hint {
            CacheHint::Cache => true,
            CacheHint::NoCache => false,
            CacheHint::Default => self.is_enabled(),
        };
        if !use_cache {
            return execute();
        }

        let key = self.fingerprinter.key(sql, params);
        match self.store.get(&key) {
            Ok(Some(entry)) => {
                self.metrics.record_hit();
                if self.log {
                    debug!("cache hit for key {key}");
                }
                if let Err(err) = self.store.record_hit(&key) {
                    self.metrics.record_store_error();
                    self.log_store_error("record_hit", &err);
                }
                return Ok(entry.result);
            }
            Ok(None) => {
                self.metrics.record_miss();
                if self.log {
                    debug!("cache miss for key {key}");
                }
            }
            Err(err) => {
                // An unreadable store is a miss.
                self.metrics.record_miss();
                self.metrics.record_store_error();
                self.log_store_error("get", &err);
            }
        }

        let result = execute()?;
        // The entry records when the statement finished, not when it began;
        // the store stamps its own write time separately.
        let executed_at = now_unix();
        match self.store.put(&key, result.clone(), sql, executed_at) {
            Ok(()) => self.metrics.record_put(),
            Err(err) => {
                self.metrics.record_store_error();
                self.log_store_error("put", &err);
            }
        }
        Ok(result)
    }

    /// Announce a write. Every cached entry depending on a table the
    /// statement touches is removed; a write whose tables cannot be
    /// derived clears the whole store. Returns the number of entries
    /// removed.
    ///
    /// Runs even while the engine is disabled, so re-enabling never
    /// serves results staled by writes made in between.
    pub fn notify_write(&self, sql: &str) -> u64 {
        let (_, sql) = extract_cache_hint(sql);
        let tables = self.extractor.extract(sql);
        match self.store.invalidate_tables(&tables, sql) {
            Ok(count) => {
                if count > 0 {
                    self.metrics.record_invalidations(count);
                    if self.log {
                        debug!("write invalidated {count} cache entries: {sql}");
                    }
                }
                count
            }
            Err(err) => {
                self.metrics.record_store_error();
                self.log_store_error("invalidate", &err);
                0
            }
        }
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        if let Err(err) = self.store.flush() {
            self.metrics.record_store_error();
            self.log_store_error("flush", &err);
        }
    }

    /// Store statistics with per-entry summaries. A failing store reports
    /// as empty.
    #[must_use]
    pub fn statistics(&self) -> StoreStats {
        match self.store.stats() {
            Ok(stats) => stats,
            Err(err) => {
                self.metrics.record_store_error();
                self.log_store_error("stats", &err);
                StoreStats::empty(self.store.name())
            }
        }
    }

    /// Mark a unit-of-work boundary for drivers that keep local state.
    pub fn reset_local(&self) {
        self.store.reset_local();
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Engine-level counters (hits, misses, evictions, swallowed errors).
    #[must_use]
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    fn log_store_error(&self, op: &str, err: &CacheError) {
        if err.is_connection() {
            error!("cache store unreachable during {op}: {err}");
        } else if self.log {
            debug!("cache {op} failed: {err}");
        }
    }
}
