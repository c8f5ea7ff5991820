//! Two-tier persistent store.
//!
//! The second tier is a Redis instance shared across processes; the first
//! is a per-process `HashMap` scoped to one unit of work, cleared at each
//! [`CacheStore::reset_local`] boundary. Repeated lookups inside a unit of
//! work hit the local map, so the remote tier is read at most once per key
//! per unit of work.
//!
//! Remote layout: each entry is one hash at `relcache:{key}` with the
//! fields `result`, `query`, `executed_at`, `cached_at`, `hits`, `tables`
//! and `last_accessed`. A set at `relcache:keys` tracks every stored key,
//! and one set per table at `relcache:table:{name}` backs invalidation.
//! Entry hashes carry the configured TTL; the tracking sets do not, so
//! members whose hash has expired linger until a later operation prunes
//! them. Removal counts come from `DEL`, which only counts keys that
//! actually existed, so expired members never inflate an invalidation
//! count.
//!
//! Multi-step operations go through [`redis::Pipeline`] values built per
//! call, one round trip each. The connection is created lazily and dropped
//! on connection-class errors so the next call reconnects.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use redis::Commands;
use tracing::debug;

use crate::config::CacheConfig;
use crate::entry::{now_unix, CacheEntry, EntrySummary, StoreStats};
use crate::error::{CacheError, Result};
use crate::store::codec::{decode_result, encode_result};
use crate::store::CacheStore;
use crate::tables::TableExtractor;
use crate::value::QueryResult;

const KEY_PREFIX: &str = "relcache:";
const KEYS_SET: &str = "relcache:keys";
const TABLE_PREFIX: &str = "relcache:table:";

const F_RESULT: &str = "result";
const F_QUERY: &str = "query";
const F_EXECUTED_AT: &str = "executed_at";
const F_CACHED_AT: &str = "cached_at";
const F_HITS: &str = "hits";
const F_TABLES: &str = "tables";
const F_LAST_ACCESSED: &str = "last_accessed";

fn entry_key(key: &str) -> String {
    format!("{KEY_PREFIX}{key}")
}

fn table_key(table: &str) -> String {
    format!("{TABLE_PREFIX}{table}")
}

/// One HMGET row covering every entry field.
type EntryRow = (
    Option<Vec<u8>>,
    Option<String>,
    Option<u64>,
    Option<u64>,
    Option<u64>,
    Option<String>,
    Option<u64>,
);

/// One HMGET row covering the summary fields.
type SummaryRow = (
    Option<String>,
    Option<String>,
    Option<u64>,
    Option<u64>,
    Option<u64>,
);

/// Two-tier store: per-unit-of-work map in front of Redis.
pub struct RedisStore {
    client: redis::Client,
    conn: Mutex<Option<redis::Connection>>,
    local: Mutex<HashMap<String, CacheEntry>>,
    extractor: TableExtractor,
    ttl_secs: i64,
    log: bool,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("ttl_secs", &self.ttl_secs)
            .field(
                "local_entries",
                &self.local.lock().map_or(0, |local| local.len()),
            )
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Build a store against the configured Redis URL. The URL is parsed
    /// here; the connection itself is opened lazily on first use.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            local: Mutex::new(HashMap::new()),
            extractor: TableExtractor::new(),
            ttl_secs: i64::try_from(config.ttl.as_secs()).unwrap_or(i64::MAX).max(1),
            log: config.logging,
        })
    }

    fn local(&self) -> Result<MutexGuard<'_, HashMap<String, CacheEntry>>> {
        self.local
            .lock()
            .map_err(|err| CacheError::lock_poisoned(err.to_string()))
    }

    /// Run one operation against the remote tier, connecting on demand.
    /// Connection-class failures drop the connection so the next call
    /// starts fresh.
    fn with_conn<T>(
        &self,
        op: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> Result<T> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|err| CacheError::lock_poisoned(err.to_string()))?;
        if guard.is_none() {
            *guard = Some(self.client.get_connection()?);
        }
        let conn = guard
            .as_mut()
            .ok_or_else(|| CacheError::config("redis connection slot empty"))?;
        match op(conn) {
            Ok(value) => Ok(value),
            Err(err) => {
                let err = CacheError::from(err);
                if err.is_connection() {
                    *guard = None;
                }
                Err(err)
            }
        }
    }

    fn scan_table_sets(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let pattern = format!("{TABLE_PREFIX}*");
            let mut sets = Vec::new();
            for set in conn.scan_match::<_, String>(&pattern)? {
                sets.push(set);
            }
            Ok(sets)
        })
    }

    /// Delete every entry hash and both tracking structures. Returns how
    /// many entries actually existed.
    fn clear_all(&self) -> Result<u64> {
        self.local()?.clear();
        let members: Vec<String> = self.with_conn(|conn| conn.smembers(KEYS_SET))?;
        let mut removed = 0u64;
        if !members.is_empty() {
            let entry_keys: Vec<String> = members.iter().map(|key| entry_key(key)).collect();
            removed = self.with_conn(|conn| conn.del(&entry_keys))?;
        }
        let table_sets = self.scan_table_sets()?;
        self.with_conn(|conn| {
            let mut pipe = redis::pipe();
            pipe.del(KEYS_SET).ignore();
            for set in &table_sets {
                pipe.del(set).ignore();
            }
            pipe.query::<()>(conn)
        })?;
        Ok(removed)
    }
}

impl CacheStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        if let Some(entry) = self.local()?.get(key) {
            return Ok(Some(entry.clone()));
        }
        let ekey = entry_key(key);
        let row: EntryRow = self.with_conn(|conn| {
            redis::cmd("HMGET")
                .arg(&ekey)
                .arg(&[
                    F_RESULT,
                    F_QUERY,
                    F_EXECUTED_AT,
                    F_CACHED_AT,
                    F_HITS,
                    F_TABLES,
                    F_LAST_ACCESSED,
                ])
                .query(conn)
        })?;
        let (payload, query, executed_at, cached_at, hits, tables_json, last_accessed) = row;
        let Some(query) = query else {
            return Ok(None);
        };
        let result = decode_result(payload.as_deref().unwrap_or_default())?.unwrap_or_default();
        let tables: BTreeSet<String> = tables_json
            .map(|json| serde_json::from_str(&json))
            .transpose()?
            .unwrap_or_default();
        let entry = CacheEntry {
            result,
            query,
            tables,
            executed_at: executed_at.unwrap_or(0),
            cached_at: cached_at.unwrap_or(0),
            hits: hits.unwrap_or(0),
            last_accessed,
        };
        self.local()?.insert(key.to_string(), entry.clone());
        Ok(Some(entry))
    }

    fn put(&self, key: &str, result: QueryResult, sql: &str, executed_at: u64) -> Result<()> {
        let tables = self.extractor.extract(sql);
        let entry = CacheEntry::new(result, sql, tables, executed_at);
        let payload = encode_result(&entry.result)?;
        let tables_json = serde_json::to_string(&entry.tables)?;
        let ekey = entry_key(key);

        let mut pipe = redis::pipe();
        pipe.hset(&ekey, F_RESULT, payload).ignore();
        pipe.hset(&ekey, F_QUERY, entry.query.as_str()).ignore();
        pipe.hset(&ekey, F_EXECUTED_AT, entry.executed_at).ignore();
        pipe.hset(&ekey, F_CACHED_AT, entry.cached_at).ignore();
        pipe.hset(&ekey, F_HITS, entry.hits).ignore();
        pipe.hset(&ekey, F_TABLES, tables_json.as_str()).ignore();
        // A re-put starts the entry's access history over.
        pipe.hdel(&ekey, F_LAST_ACCESSED).ignore();
        pipe.expire(&ekey, self.ttl_secs).ignore();
        pipe.sadd(KEYS_SET, key).ignore();
        for table in &entry.tables {
            pipe.sadd(table_key(table), key).ignore();
        }
        // L1 is populated before the remote write; a failed write still
        // leaves the rest of the unit of work served locally.
        self.local()?.insert(key.to_string(), entry);
        self.with_conn(|conn| pipe.query::<()>(conn))?;
        Ok(())
    }

    fn has(&self, key: &str) -> Result<bool> {
        if self.local()?.contains_key(key) {
            return Ok(true);
        }
        self.with_conn(|conn| conn.exists(entry_key(key)))
    }

    fn forget(&self, key: &str) -> Result<()> {
        self.local()?.remove(key);
        let ekey = entry_key(key);
        let tables_json: Option<String> = self.with_conn(|conn| conn.hget(&ekey, F_TABLES))?;
        let tables: BTreeSet<String> = tables_json
            .map(|json| serde_json::from_str(&json))
            .transpose()?
            .unwrap_or_default();
        let mut pipe = redis::pipe();
        pipe.del(&ekey).ignore();
        pipe.srem(KEYS_SET, key).ignore();
        for table in &tables {
            pipe.srem(table_key(table), key).ignore();
        }
        self.with_conn(|conn| pipe.query::<()>(conn))?;
        Ok(())
    }

    fn invalidate_tables(&self, tables: &BTreeSet<String>, triggering_sql: &str) -> Result<u64> {
        if tables.is_empty() {
            let removed = self.clear_all()?;
            if self.log {
                debug!("tables unknown for write, cleared {removed} entries: {triggering_sql}");
            }
            return Ok(removed);
        }

        self.local()?
            .retain(|_, entry| entry.tables.is_disjoint(tables));

        let set_keys: Vec<String> = tables.iter().map(|table| table_key(table)).collect();
        let members: Vec<String> = self.with_conn(|conn| conn.sunion(&set_keys))?;
        let removed = if members.is_empty() {
            self.with_conn(|conn| {
                let mut pipe = redis::pipe();
                for set in &set_keys {
                    pipe.del(set).ignore();
                }
                pipe.query::<()>(conn)
            })?;
            0
        } else {
            let entry_keys: Vec<String> = members.iter().map(|key| entry_key(key)).collect();
            self.with_conn(|conn| {
                // Record and set deletions go out as one batch; the one
                // un-ignored DEL reply is the removed count.
                let mut pipe = redis::pipe();
                pipe.del(&entry_keys);
                pipe.srem(KEYS_SET, &members).ignore();
                for set in &set_keys {
                    pipe.del(set).ignore();
                }
                let (removed,): (u64,) = pipe.query(conn)?;
                Ok(removed)
            })?
        };
        if self.log && removed > 0 {
            debug!("invalidated {removed} entries for write: {triggering_sql}");
        }
        Ok(removed)
    }

    fn flush(&self) -> Result<()> {
        self.clear_all()?;
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats> {
        let mut keys: Vec<String> = self.with_conn(|conn| conn.smembers(KEYS_SET))?;
        keys.sort();
        if keys.is_empty() {
            return Ok(StoreStats::empty(self.name()));
        }
        let rows: Vec<SummaryRow> = self.with_conn(|conn| {
            let mut pipe = redis::pipe();
            for key in &keys {
                pipe.cmd("HMGET").arg(entry_key(key)).arg(&[
                    F_QUERY,
                    F_TABLES,
                    F_HITS,
                    F_CACHED_AT,
                    F_LAST_ACCESSED,
                ]);
            }
            pipe.query(conn)
        })?;

        let mut entries = Vec::new();
        let mut stale = Vec::new();
        let mut total_hits = 0u64;
        for (key, (query, tables_json, hits, cached_at, last_accessed)) in
            keys.iter().zip(rows)
        {
            let Some(query) = query else {
                stale.push(key.clone());
                continue;
            };
            let tables: BTreeSet<String> = tables_json
                .map(|json| serde_json::from_str(&json))
                .transpose()?
                .unwrap_or_default();
            let hits = hits.unwrap_or(0);
            total_hits += hits;
            entries.push(EntrySummary {
                key: key.clone(),
                query,
                tables,
                hits,
                cached_at: cached_at.unwrap_or(0),
                last_accessed,
            });
        }
        if !stale.is_empty() {
            self.with_conn(|conn| conn.srem::<_, _, ()>(KEYS_SET, &stale))?;
        }
        Ok(StoreStats {
            driver: self.name().to_string(),
            cached_count: entries.len(),
            total_hits,
            entries,
        })
    }

    fn record_hit(&self, key: &str) -> Result<()> {
        // HINCRBY on a vanished key would resurrect it as a bare counter,
        // so existence is checked first.
        let ekey = entry_key(key);
        let exists: bool = self.with_conn(|conn| conn.exists(&ekey))?;
        if exists {
            let mut pipe = redis::pipe();
            pipe.cmd("HINCRBY").arg(&ekey).arg(F_HITS).arg(1).ignore();
            pipe.hset(&ekey, F_LAST_ACCESSED, now_unix()).ignore();
            pipe.expire(&ekey, self.ttl_secs).ignore();
            self.with_conn(|conn| pipe.query::<()>(conn))?;
        }
        // The shared counter is authoritative; a local copy holding the
        // old count would serve stale hit totals for the rest of the
        // unit of work.
        self.local()?.remove(key);
        Ok(())
    }

    fn all_keys(&self) -> Result<Vec<String>> {
        let members: Vec<String> = self.with_conn(|conn| conn.smembers(KEYS_SET))?;
        if members.is_empty() {
            return Ok(Vec::new());
        }
        let alive: Vec<bool> = self.with_conn(|conn| {
            let mut pipe = redis::pipe();
            for key in &members {
                pipe.exists(entry_key(key));
            }
            pipe.query(conn)
        })?;
        let mut live = Vec::new();
        let mut stale = Vec::new();
        for (key, alive) in members.into_iter().zip(alive) {
            if alive {
                live.push(key);
            } else {
                stale.push(key);
            }
        }
        if !stale.is_empty() {
            self.with_conn(|conn| conn.srem::<_, _, ()>(KEYS_SET, &stale))?;
        }
        live.sort();
        Ok(live)
    }

    fn reset_local(&self) {
        if let Ok(mut local) = self.local.lock() {
            local.clear();
        }
    }
}
