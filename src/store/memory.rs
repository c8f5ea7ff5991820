//! Bounded in-process store.
//!
//! Entries live in a `HashMap` guarded by one `RwLock`, alongside two
//! derived structures kept in lockstep: `lru_order`, a recency list (oldest
//! first, insertion order breaks ties), and `table_index`, mapping each
//! lowercased table name to the keys whose entries depend on it.
//!
//! Reads never reorder anything. A plain [`MemoryStore::get`] is free of
//! side effects; recency moves only when the caller confirms a hit through
//! [`MemoryStore::record_hit`]. When an insert finds the store at capacity
//! it first evicts a batch of the oldest tenth (rounded up, at least one),
//! so sustained churn pays the eviction scan once per batch rather than on
//! every insert.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::entry::{CacheEntry, EntrySummary, StoreStats};
use crate::error::{CacheError, Result};
use crate::metrics::CacheMetrics;
use crate::store::CacheStore;
use crate::tables::TableExtractor;
use crate::value::QueryResult;

/// Interior state: the entry map plus its two derived indexes.
#[derive(Debug, Default)]
struct StoreState {
    entries: HashMap<String, CacheEntry>,
    /// Keys ordered oldest first. Pushed on insert and on recorded hits.
    lru_order: Vec<String>,
    /// Lowercased table name to the keys depending on it.
    table_index: HashMap<String, BTreeSet<String>>,
}

impl StoreState {
    /// Remove one entry and every index membership it holds. Returns
    /// whether an entry was actually present.
    fn remove(&mut self, key: &str) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        self.lru_order.retain(|k| k != key);
        self.unindex(key, &entry.tables);
        true
    }

    /// Evict up to `count` of the oldest entries. Returns how many went.
    fn evict_oldest(&mut self, count: usize) -> usize {
        let count = count.min(self.lru_order.len());
        if count == 0 {
            return 0;
        }
        let victims: Vec<String> = self.lru_order.drain(..count).collect();
        let mut removed = 0;
        for key in victims {
            if let Some(entry) = self.entries.remove(&key) {
                self.unindex(&key, &entry.tables);
                removed += 1;
            }
        }
        removed
    }

    fn unindex(&mut self, key: &str, tables: &BTreeSet<String>) {
        for table in tables {
            if let Some(keys) = self.table_index.get_mut(table) {
                keys.remove(key);
                if keys.is_empty() {
                    self.table_index.remove(table);
                }
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.lru_order.clear();
        self.table_index.clear();
    }
}

/// Bounded in-process store with batched LRU eviction.
#[derive(Debug)]
pub struct MemoryStore {
    max_entries: usize,
    log: bool,
    extractor: TableExtractor,
    metrics: Arc<CacheMetrics>,
    state: RwLock<StoreState>,
}

/// One tenth of capacity rounded up, never zero.
fn eviction_batch(max_entries: usize) -> usize {
    max_entries.div_ceil(10).max(1)
}

impl MemoryStore {
    #[must_use]
    pub fn new(max_entries: usize, logging: bool, metrics: &Arc<CacheMetrics>) -> Self {
        Self {
            max_entries,
            log: logging,
            extractor: TableExtractor::new(),
            metrics: Arc::clone(metrics),
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Current entry count. Reports zero if the lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().map_or(0, |state| state.entries.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|err| CacheError::lock_poisoned(err.to_string()))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|err| CacheError::lock_poisoned(err.to_string()))
    }
}

impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.read_state()?.entries.get(key).cloned())
    }

    fn put(&self, key: &str, result: QueryResult, sql: &str, executed_at: u64) -> Result<()> {
        let tables = self.extractor.extract(sql);
        let entry = CacheEntry::new(result, sql, tables, executed_at);

        let mut state = self.write_state()?;
        // Overwrites drop the old entry first so stale index memberships
        // never survive a re-put.
        state.remove(key);
        if state.entries.len() >= self.max_entries {
            let evicted = state.evict_oldest(eviction_batch(self.max_entries));
            if evicted > 0 {
                self.metrics.record_evictions(evicted);
                if self.log {
                    debug!("cache at capacity, evicted {evicted} oldest entries");
                }
            }
        }
        for table in &entry.tables {
            state
                .table_index
                .entry(table.clone())
                .or_default()
                .insert(key.to_string());
        }
        state.lru_order.push(key.to_string());
        state.entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn has(&self, key: &str) -> Result<bool> {
        Ok(self.read_state()?.entries.contains_key(key))
    }

    fn forget(&self, key: &str) -> Result<()> {
        self.write_state()?.remove(key);
        Ok(())
    }

    fn invalidate_tables(&self, tables: &BTreeSet<String>, triggering_sql: &str) -> Result<u64> {
        let mut state = self.write_state()?;
        if tables.is_empty() {
            let count = state.entries.len() as u64;
            state.clear();
            if self.log {
                debug!("tables unknown for write, cleared {count} entries: {triggering_sql}");
            }
            return Ok(count);
        }

        let mut victims: BTreeSet<String> = BTreeSet::new();
        for table in tables {
            if let Some(keys) = state.table_index.get(table) {
                victims.extend(keys.iter().cloned());
            }
        }
        let mut removed = 0u64;
        for key in &victims {
            if state.remove(key) {
                removed += 1;
            }
        }
        if self.log && removed > 0 {
            debug!("invalidated {removed} entries for write: {triggering_sql}");
        }
        Ok(removed)
    }

    fn flush(&self) -> Result<()> {
        self.write_state()?.clear();
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats> {
        let state = self.read_state()?;
        let mut entries: Vec<EntrySummary> = state
            .entries
            .iter()
            .map(|(key, entry)| entry.summary(key))
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(StoreStats {
            driver: self.name().to_string(),
            cached_count: state.entries.len(),
            total_hits: state.entries.values().map(|entry| entry.hits).sum(),
            entries,
        })
    }

    fn record_hit(&self, key: &str) -> Result<()> {
        let mut state = self.write_state()?;
        if let Some(entry) = state.entries.get_mut(key) {
            entry.record_hit();
        } else {
            return Ok(());
        }
        state.lru_order.retain(|k| k != key);
        state.lru_order.push(key.to_string());
        Ok(())
    }

    fn all_keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.read_state()?.entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::now_unix;
    use crate::value::Value;

    fn store(max_entries: usize) -> MemoryStore {
        MemoryStore::new(max_entries, false, &Arc::new(CacheMetrics::new()))
    }

    fn sample_result() -> QueryResult {
        QueryResult::new(
            vec!["id".to_string()],
            vec![vec![Value::Int(1)], vec![Value::Int(2)]],
        )
    }

    fn put(s: &MemoryStore, key: &str, sql: &str) {
        s.put(key, sample_result(), sql, now_unix())
            .expect("put should succeed");
    }

    #[test]
    fn test_put_and_get() {
        let s = store(10);
        put(&s, "k1", "SELECT * FROM users");

        let entry = s
            .get("k1")
            .expect("get should succeed")
            .expect("entry should exist");
        assert_eq!(entry.result, sample_result());
        assert_eq!(entry.query, "SELECT * FROM users");
        assert!(entry.tables.contains("users"));
        assert_eq!(entry.hits, 0);
        assert!(s.has("k1").expect("has should succeed"));
    }

    #[test]
    fn test_get_never_written_key() {
        let s = store(10);
        assert!(s.get("missing").expect("get should succeed").is_none());
        assert!(!s.has("missing").expect("has should succeed"));
    }

    #[test]
    fn test_overwrite_keeps_single_entry() {
        let s = store(10);
        put(&s, "k1", "SELECT * FROM users");
        put(&s, "k1", "SELECT * FROM users");

        assert_eq!(s.len(), 1);
        let state = s.read_state().expect("lock should not be poisoned");
        assert_eq!(state.lru_order.len(), 1);
        assert_eq!(
            state.table_index.get("users").map(BTreeSet::len),
            Some(1)
        );
    }

    #[test]
    fn test_forget_removes_entry_and_index() {
        let s = store(10);
        put(&s, "k1", "SELECT * FROM users");
        s.forget("k1").expect("forget should succeed");

        assert!(s.is_empty());
        let state = s.read_state().expect("lock should not be poisoned");
        assert!(state.table_index.is_empty());
        assert!(state.lru_order.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest_entry() {
        let s = store(10);
        for i in 0..10 {
            put(&s, &format!("k{i}"), &format!("SELECT {i} FROM t{i}"));
        }
        put(&s, "k10", "SELECT 10 FROM t10");

        // Batch size for capacity 10 is one, so exactly the oldest goes.
        assert_eq!(s.len(), 10);
        assert!(!s.has("k0").expect("has should succeed"));
        assert!(s.has("k1").expect("has should succeed"));
        assert!(s.has("k10").expect("has should succeed"));
    }

    #[test]
    fn test_capacity_evicts_in_batches() {
        let s = store(20);
        for i in 0..20 {
            put(&s, &format!("k{i}"), &format!("SELECT {i} FROM t{i}"));
        }
        put(&s, "k20", "SELECT 20 FROM t20");

        // ceil(20 * 0.1) = 2 evicted, then one inserted.
        assert_eq!(s.len(), 19);
        assert!(!s.has("k0").expect("has should succeed"));
        assert!(!s.has("k1").expect("has should succeed"));
        assert!(s.has("k2").expect("has should succeed"));
    }

    #[test]
    fn test_eviction_batch_rounding() {
        assert_eq!(eviction_batch(10), 1);
        assert_eq!(eviction_batch(15), 2);
        assert_eq!(eviction_batch(100), 10);
        assert_eq!(eviction_batch(5), 1);
        assert_eq!(eviction_batch(0), 1);
    }

    #[test]
    fn test_get_has_no_recency_effect() {
        let s = store(10);
        for i in 0..10 {
            put(&s, &format!("k{i}"), &format!("SELECT {i} FROM t{i}"));
        }
        // A plain get must not rescue k0 from eviction.
        s.get("k0").expect("get should succeed");
        put(&s, "k10", "SELECT 10 FROM t10");

        assert!(!s.has("k0").expect("has should succeed"));
    }

    #[test]
    fn test_record_hit_refreshes_recency() {
        let s = store(10);
        for i in 0..10 {
            put(&s, &format!("k{i}"), &format!("SELECT {i} FROM t{i}"));
        }
        s.record_hit("k0").expect("record_hit should succeed");
        put(&s, "k10", "SELECT 10 FROM t10");

        assert!(s.has("k0").expect("has should succeed"));
        assert!(!s.has("k1").expect("has should succeed"));
        let entry = s
            .get("k0")
            .expect("get should succeed")
            .expect("entry should exist");
        assert_eq!(entry.hits, 1);
        assert!(entry.last_accessed.is_some());
    }

    #[test]
    fn test_record_hit_on_absent_key_is_noop() {
        let s = store(10);
        s.record_hit("missing").expect("record_hit should succeed");
        assert!(s.is_empty());
    }

    #[test]
    fn test_invalidate_tables_removes_exact_set() {
        let s = store(10);
        put(&s, "k1", "SELECT * FROM users");
        put(&s, "k2", "SELECT * FROM orders");
        put(&s, "k3", "SELECT * FROM users JOIN orders ON orders.user_id = users.id");

        let tables: BTreeSet<String> = ["orders".to_string()].into();
        let removed = s
            .invalidate_tables(&tables, "UPDATE orders SET total = 0")
            .expect("invalidate should succeed");

        assert_eq!(removed, 2);
        assert!(s.has("k1").expect("has should succeed"));
        assert!(!s.has("k2").expect("has should succeed"));
        assert!(!s.has("k3").expect("has should succeed"));
    }

    #[test]
    fn test_invalidate_counts_multi_table_entry_once() {
        let s = store(10);
        put(&s, "k1", "SELECT * FROM users JOIN orders ON orders.user_id = users.id");

        let tables: BTreeSet<String> =
            ["users".to_string(), "orders".to_string()].into();
        let removed = s
            .invalidate_tables(&tables, "DELETE FROM users")
            .expect("invalidate should succeed");

        assert_eq!(removed, 1);
        assert!(s.is_empty());
    }

    #[test]
    fn test_invalidate_leaves_no_stale_index() {
        let s = store(10);
        put(&s, "k1", "SELECT * FROM users JOIN orders ON orders.user_id = users.id");
        put(&s, "k2", "SELECT * FROM orders");

        let users: BTreeSet<String> = ["users".to_string()].into();
        assert_eq!(
            s.invalidate_tables(&users, "UPDATE users SET name = 'x'")
                .expect("invalidate should succeed"),
            1
        );

        // k1 is gone from the orders index too, so only k2 remains to go.
        let orders: BTreeSet<String> = ["orders".to_string()].into();
        assert_eq!(
            s.invalidate_tables(&orders, "UPDATE orders SET total = 0")
                .expect("invalidate should succeed"),
            1
        );
        assert!(s.is_empty());
    }

    #[test]
    fn test_invalidate_unknown_tables_clears_all() {
        let s = store(10);
        put(&s, "k1", "SELECT * FROM users");
        put(&s, "k2", "SELECT * FROM orders");

        let removed = s
            .invalidate_tables(&BTreeSet::new(), "EXEC some_procedure")
            .expect("invalidate should succeed");

        assert_eq!(removed, 2);
        assert!(s.is_empty());
    }

    #[test]
    fn test_invalidate_unrelated_table_removes_nothing() {
        let s = store(10);
        put(&s, "k1", "SELECT * FROM users");

        let tables: BTreeSet<String> = ["audit_log".to_string()].into();
        assert_eq!(
            s.invalidate_tables(&tables, "INSERT INTO audit_log VALUES (1)")
                .expect("invalidate should succeed"),
            0
        );
        assert!(s.has("k1").expect("has should succeed"));
    }

    #[test]
    fn test_flush_empties_store() {
        let s = store(10);
        put(&s, "k1", "SELECT * FROM users");
        put(&s, "k2", "SELECT * FROM orders");
        s.flush().expect("flush should succeed");

        assert!(s.is_empty());
        assert!(s.all_keys().expect("all_keys should succeed").is_empty());
    }

    #[test]
    fn test_stats_reports_counts_and_hits() {
        let s = store(10);
        put(&s, "k1", "SELECT * FROM users");
        put(&s, "k2", "SELECT * FROM orders");
        s.record_hit("k1").expect("record_hit should succeed");
        s.record_hit("k1").expect("record_hit should succeed");
        s.record_hit("k2").expect("record_hit should succeed");

        let stats = s.stats().expect("stats should succeed");
        assert_eq!(stats.driver, "memory");
        assert_eq!(stats.cached_count, 2);
        assert_eq!(stats.total_hits, 3);
        assert_eq!(stats.entries.len(), 2);
        assert_eq!(stats.entries[0].key, "k1");
        assert_eq!(stats.entries[0].hits, 2);
        assert_eq!(stats.entries[1].key, "k2");
        assert!(stats.entries[1].tables.contains("orders"));
    }

    #[test]
    fn test_all_keys_sorted() {
        let s = store(10);
        put(&s, "b", "SELECT * FROM users");
        put(&s, "a", "SELECT * FROM orders");
        put(&s, "c", "SELECT * FROM items");

        assert_eq!(
            s.all_keys().expect("all_keys should succeed"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn test_eviction_feeds_metrics() {
        let metrics = Arc::new(CacheMetrics::new());
        let s = MemoryStore::new(10, false, &metrics);
        for i in 0..11 {
            s.put(
                &format!("k{i}"),
                sample_result(),
                &format!("SELECT {i} FROM t{i}"),
                now_unix(),
            )
            .expect("put should succeed");
        }
        assert_eq!(metrics.evictions(), 1);
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let s = store(10);
        for i in 0..50 {
            put(&s, &format!("k{i}"), &format!("SELECT {i} FROM t{i}"));
        }
        assert!(s.len() <= 10);
    }
}
