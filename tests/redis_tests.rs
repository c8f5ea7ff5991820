//! Integration tests for the two-tier Redis driver.
//!
//! These need a reachable Redis server and share its keyspace, so they are
//! ignored by default. Run them serially against a disposable instance:
//!
//! ```text
//! cargo test --test redis_tests -- --ignored --test-threads=1
//! ```
//!
//! The server URL comes from `RELCACHE_REDIS_URL` when set, otherwise
//! `redis://127.0.0.1:6379/`.

use std::collections::BTreeSet;
use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use relcache::{params, CacheConfig, CacheEngine, CacheStore, QueryResult, RedisStore, Value};

fn redis_config() -> CacheConfig {
    let url = std::env::var("RELCACHE_REDIS_URL")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379/".to_string());
    CacheConfig::new()
        .driver("redis")
        .redis_url(url)
        .ttl(Duration::from_secs(60))
}

fn redis_store() -> RedisStore {
    RedisStore::new(&redis_config()).expect("failed to build redis store")
}

/// A fresh store with an empty keyspace.
fn clean_store() -> RedisStore {
    let store = redis_store();
    store.flush().expect("failed to flush redis store");
    store
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

fn result_with(n: i64) -> QueryResult {
    QueryResult::new(vec!["n".to_string()], vec![vec![Value::Int(n)]])
}

fn tables(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

// ============================================================================
// Round Trip Tests
// ============================================================================

#[test]
#[ignore = "requires a running redis server"]
fn test_redis_round_trip() {
    let store = clean_store();
    store
        .put("key-a", result_with(1), "SELECT * FROM users", now())
        .expect("put should succeed");

    let entry = store
        .get("key-a")
        .expect("get should succeed")
        .expect("entry should be present");
    assert_eq!(entry.result, result_with(1));
    assert_eq!(entry.query, "SELECT * FROM users");
    assert_eq!(entry.tables, tables(&["users"]));
    assert_eq!(entry.hits, 0);

    assert!(store.has("key-a").expect("has should succeed"));
    assert_eq!(
        store.all_keys().expect("all_keys should succeed"),
        vec!["key-a".to_string()]
    );

    store.forget("key-a").expect("forget should succeed");
    store.reset_local();
    assert!(store.get("key-a").expect("get should succeed").is_none());
}

#[test]
#[ignore = "requires a running redis server"]
fn test_redis_large_payload_round_trip() {
    let store = clean_store();
    let big = QueryResult::new(
        vec!["id".to_string(), "payload".to_string()],
        (0..2000i64)
            .map(|i| vec![Value::Int(i), Value::String("x".repeat(40))])
            .collect(),
    );
    store
        .put("key-big", big.clone(), "SELECT * FROM blobs", now())
        .expect("put should succeed");

    // Read through a second store so the payload really crosses the wire.
    let other = redis_store();
    let entry = other
        .get("key-big")
        .expect("get should succeed")
        .expect("entry should be present");
    assert_eq!(entry.result, big);
}

// ============================================================================
// Two-Tier Semantics Tests
// ============================================================================

#[test]
#[ignore = "requires a running redis server"]
fn test_redis_local_tier_avoids_second_remote_read() {
    let writer = clean_store();
    writer
        .put("key-a", result_with(1), "SELECT * FROM users", now())
        .expect("put should succeed");

    let reader = redis_store();
    assert!(reader
        .get("key-a")
        .expect("get should succeed")
        .is_some());

    // The entry vanishes from the shared tier, but the reader keeps its
    // local copy until the unit of work ends.
    writer.forget("key-a").expect("forget should succeed");
    assert!(reader
        .get("key-a")
        .expect("get should succeed")
        .is_some());

    reader.reset_local();
    assert!(reader.get("key-a").expect("get should succeed").is_none());
}

#[test]
#[ignore = "requires a running redis server"]
fn test_redis_hit_counts_are_shared_and_authoritative() {
    let store = clean_store();
    store
        .put("key-a", result_with(1), "SELECT * FROM users", now())
        .expect("put should succeed");

    let other = redis_store();
    other.record_hit("key-a").expect("record_hit should succeed");
    other.record_hit("key-a").expect("record_hit should succeed");

    // The first store still holds its local copy from the put.
    let local = store
        .get("key-a")
        .expect("get should succeed")
        .expect("entry should be present");
    assert_eq!(local.hits, 0);

    // After the boundary the shared counter is visible.
    store.reset_local();
    let shared = store
        .get("key-a")
        .expect("get should succeed")
        .expect("entry should be present");
    assert_eq!(shared.hits, 2);
    assert!(shared.last_accessed.is_some());
}

#[test]
#[ignore = "requires a running redis server"]
fn test_redis_record_hit_on_missing_key_creates_nothing() {
    let store = clean_store();
    store
        .record_hit("never-stored")
        .expect("record_hit should succeed");

    assert!(store.all_keys().expect("all_keys should succeed").is_empty());
    assert!(!store.has("never-stored").expect("has should succeed"));
}

// ============================================================================
// Invalidation Tests
// ============================================================================

#[test]
#[ignore = "requires a running redis server"]
fn test_redis_invalidation_across_stores() {
    let writer = clean_store();
    writer
        .put("k1", result_with(1), "SELECT * FROM users", now())
        .expect("put should succeed");
    writer
        .put("k2", result_with(2), "SELECT * FROM orders", now())
        .expect("put should succeed");
    writer
        .put(
            "k3",
            result_with(3),
            "SELECT * FROM users JOIN orders ON orders.user_id = users.id",
            now(),
        )
        .expect("put should succeed");

    let other = redis_store();
    let removed = other
        .invalidate_tables(&tables(&["orders"]), "UPDATE orders SET total = 0")
        .expect("invalidate should succeed");
    assert_eq!(removed, 2);

    writer.reset_local();
    assert!(writer.has("k1").expect("has should succeed"));
    assert!(!writer.has("k2").expect("has should succeed"));
    assert!(!writer.has("k3").expect("has should succeed"));

    // The same batch that deleted the records also dropped their set
    // memberships: repeating the write removes nothing and the key set
    // only lists the survivor.
    let repeat = other
        .invalidate_tables(&tables(&["orders"]), "UPDATE orders SET total = 0")
        .expect("invalidate should succeed");
    assert_eq!(repeat, 0);
    assert_eq!(other.all_keys().expect("all_keys should succeed"), vec!["k1"]);
}

#[test]
#[ignore = "requires a running redis server"]
fn test_redis_unknown_write_clears_the_store() {
    let store = clean_store();
    for i in 0..4i64 {
        store
            .put(
                &format!("k{i}"),
                result_with(i),
                &format!("SELECT * FROM t{i}"),
                now(),
            )
            .expect("put should succeed");
    }

    let removed = store
        .invalidate_tables(&BTreeSet::new(), "CALL refresh_everything()")
        .expect("invalidate should succeed");

    assert_eq!(removed, 4);
    assert!(store.all_keys().expect("all_keys should succeed").is_empty());
    assert_eq!(store.stats().expect("stats should succeed").cached_count, 0);
}

#[test]
#[ignore = "requires a running redis server"]
fn test_redis_expired_entries_do_not_inflate_counts() {
    let config = redis_config().ttl(Duration::from_secs(1));
    let store = RedisStore::new(&config).expect("failed to build redis store");
    store.flush().expect("failed to flush redis store");

    store
        .put("key-a", result_with(1), "SELECT * FROM users", now())
        .expect("put should succeed");
    sleep(Duration::from_millis(1500));
    store.reset_local();

    // The hash expired; the lingering set member must not count.
    let removed = store
        .invalidate_tables(&tables(&["users"]), "DELETE FROM users")
        .expect("invalidate should succeed");
    assert_eq!(removed, 0);
    assert!(store.all_keys().expect("all_keys should succeed").is_empty());
}

// ============================================================================
// Stats and Engine Tests
// ============================================================================

#[test]
#[ignore = "requires a running redis server"]
fn test_redis_stats_report_entries_and_hits() {
    let store = clean_store();
    store
        .put("k1", result_with(1), "SELECT * FROM users", now())
        .expect("put should succeed");
    store
        .put("k2", result_with(2), "SELECT * FROM orders", now())
        .expect("put should succeed");
    store.record_hit("k1").expect("record_hit should succeed");

    let stats = store.stats().expect("stats should succeed");
    assert_eq!(stats.driver, "redis");
    assert_eq!(stats.cached_count, 2);
    assert_eq!(stats.total_hits, 1);
    let keys: Vec<&str> = stats.entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["k1", "k2"]);
    assert_eq!(stats.entries[0].query, "SELECT * FROM users");
}

#[test]
#[ignore = "requires a running redis server"]
fn test_engine_over_redis_serves_repeat_reads() {
    let engine = CacheEngine::new(redis_config());
    engine.clear();
    let mut executions = 0;

    for _ in 0..3 {
        let result = engine
            .fetch(
                "SELECT * FROM users WHERE id = ?",
                &params!(7),
                || -> Result<QueryResult, std::io::Error> {
                    executions += 1;
                    Ok(result_with(7))
                },
            )
            .expect("fetch should succeed");
        assert_eq!(result, result_with(7));
    }

    assert_eq!(executions, 1);
    assert_eq!(engine.notify_write("UPDATE users SET name = 'x'"), 1);
    assert_eq!(engine.statistics().cached_count, 0);
}
