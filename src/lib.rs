//! `relcache` - A Query-Result Cache for Relational Database Access
//!
//! relcache sits between application code and a relational database driver,
//! caching read results and invalidating them when writes land on the
//! tables they came from.
//!
//! # Features
//!
//! - **Transparent reads**: wrap a query in [`CacheEngine::fetch`] and the
//!   second execution comes from the cache
//! - **Write-through invalidation**: announce writes with
//!   [`CacheEngine::notify_write`] and dependent entries disappear
//! - **Pluggable stores**: bounded in-process LRU, two-tier Redis, or a
//!   no-op null driver, selected by configuration
//! - **Fail-open**: a broken cache store degrades to a pass-through, it
//!   never breaks the underlying query
//!
//! # Quick Start
//!
//! ```
//! use relcache::{params, CacheConfig, CacheEngine, QueryResult};
//!
//! let engine = CacheEngine::new(CacheConfig::new().max_entries(500));
//!
//! // First fetch executes the closure; the second is served from cache.
//! let run = || {
//!     Ok::<_, std::io::Error>(QueryResult::new(
//!         vec!["name".to_string()],
//!         vec![vec!["ada".into()]],
//!     ))
//! };
//! let rows = engine.fetch("SELECT name FROM users WHERE id = ?", &params!(7), run)?;
//! assert_eq!(rows.len(), 1);
//!
//! // A write on users removes every entry that read from users.
//! engine.notify_write("UPDATE users SET name = 'grace' WHERE id = 7");
//! assert_eq!(engine.statistics().cached_count, 0);
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! # Choosing a Store
//!
//! The driver name in [`CacheConfig`] picks the store:
//!
//! ```ignore
//! use relcache::{CacheConfig, CacheEngine};
//! use std::time::Duration;
//!
//! // Two-tier: per-unit-of-work map in front of a shared Redis.
//! let engine = CacheEngine::new(
//!     CacheConfig::new()
//!         .driver("redis")
//!         .redis_url("redis://cache.internal:6379/")
//!         .ttl(Duration::from_secs(600)),
//! );
//!
//! // Call at unit-of-work boundaries so local copies never outlive one.
//! engine.reset_local();
//! ```
//!
//! # Modules
//!
//! - [`config`] - Cache configuration
//! - [`engine`] - The cache façade
//! - [`store`] - Store drivers and their shared contract
//! - [`fingerprint`] - Statement normalization and cache keys
//! - [`tables`] - Table-name derivation for invalidation
//! - [`error`] - Error types

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod fingerprint;
pub mod hints;
pub mod metrics;
pub mod store;
pub mod tables;
pub mod value;

// Re-export the primary API surface
pub use config::CacheConfig;
pub use engine::CacheEngine;
pub use entry::{CacheEntry, EntrySummary, StoreStats};
pub use error::{CacheError, Result};
pub use hints::{extract_cache_hint, CacheHint};
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use value::{QueryResult, Value};

// Re-export the store layer for callers wiring drivers directly
pub use fingerprint::{normalize_sql, Fingerprinter};
pub use store::{CacheStore, MemoryStore, NullStore, RedisStore, Store};
pub use tables::{extract_tables, TableExtractor};
