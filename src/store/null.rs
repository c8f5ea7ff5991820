//! Always-miss store.
//!
//! Every lookup misses and every write is discarded. This is the resolved
//! driver when caching is configured off, and the fallback when an unknown
//! driver name or an unusable remote tier is encountered.

use std::collections::BTreeSet;

use crate::entry::{CacheEntry, StoreStats};
use crate::error::Result;
use crate::store::CacheStore;
use crate::value::QueryResult;

/// A store that never holds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl NullStore {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CacheStore for NullStore {
    fn name(&self) -> &'static str {
        "null"
    }

    fn get(&self, _key: &str) -> Result<Option<CacheEntry>> {
        Ok(None)
    }

    fn put(&self, _key: &str, _result: QueryResult, _sql: &str, _executed_at: u64) -> Result<()> {
        Ok(())
    }

    fn has(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }

    fn forget(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn invalidate_tables(&self, _tables: &BTreeSet<String>, _triggering_sql: &str) -> Result<u64> {
        Ok(0)
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats::empty("null"))
    }

    fn record_hit(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn all_keys(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
