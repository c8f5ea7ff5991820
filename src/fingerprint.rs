//! Cache key derivation from statement text and parameters.
//!
//! A fingerprint is a 128-bit xxh3 hash, rendered as 32 hex characters, over
//! the normalized statement text concatenated with the serialized parameter
//! list. Normalization makes keys insensitive to letter case and incidental
//! whitespace; the parameter serialization is order-preserving and keeps
//! types apart, so `10` and `"10"` never produce the same key.

use dashmap::DashMap;
use xxhash_rust::xxh3::xxh3_128;

use crate::value::Value;

/// Normalize statement text for fingerprinting.
///
/// Leading/trailing whitespace is trimmed, every interior whitespace run
/// (spaces, tabs, newlines) collapses to a single space, and the text is
/// uppercased.
///
/// # Examples
///
/// ```
/// use relcache::fingerprint::normalize_sql;
///
/// assert_eq!(
///     normalize_sql("  select *\n  from users  "),
///     "SELECT * FROM USERS"
/// );
/// ```
#[must_use]
pub fn normalize_sql(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut in_whitespace = false;
    for ch in sql.trim().chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push(' ');
                in_whitespace = true;
            }
        } else {
            for upper in ch.to_uppercase() {
                out.push(upper);
            }
            in_whitespace = false;
        }
    }
    out
}

/// Derives cache keys from (statement text, parameter list) pairs.
///
/// Normalization results are memoized per distinct input string for the
/// lifetime of this instance; the same statement text recurs heavily in
/// request-scoped workloads, so the memo trades a little memory for skipping
/// the normalization pass on every call.
#[derive(Debug, Default)]
pub struct Fingerprinter {
    normalized: DashMap<String, String>,
}

impl Fingerprinter {
    /// Create a fingerprinter with an empty memo.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the cache key for a statement and its parameters.
    ///
    /// Two calls with the same normalized text and the same parameters
    /// return the same key; differing in either returns a different key.
    #[must_use]
    pub fn key(&self, sql: &str, params: &[Value]) -> String {
        let normalized = match self.normalized.get(sql) {
            Some(cached) => cached.clone(),
            None => {
                let fresh = normalize_sql(sql);
                self.normalized.insert(sql.to_string(), fresh.clone());
                fresh
            }
        };

        // Non-finite floats serialize as null, so this cannot fail for
        // Value lists; the Debug fallback keeps key derivation total anyway.
        let serialized =
            serde_json::to_string(params).unwrap_or_else(|_| format!("{params:?}"));

        let mut input = normalized;
        input.push_str(&serialized);
        format!("{:032x}", xxh3_128(input.as_bytes()))
    }

    /// Number of distinct statement texts memoized so far.
    #[must_use]
    pub fn memo_len(&self) -> usize {
        self.normalized.len()
    }
}
