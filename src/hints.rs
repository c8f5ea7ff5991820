//! Cache hint parsing.
//!
//! Callers can override caching per statement with an Oracle-style comment
//! hint at the front of the text:
//! - `/*+ CACHE */` forces cache participation, even while the engine is
//!   disabled
//! - `/*+ NO_CACHE */` bypasses the cache for this read
//!
//! The hint is stripped before fingerprinting and execution, so hinted and
//! unhinted forms of the same statement share a cache key.

/// Cache hint extracted from a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheHint {
    /// Use the engine's configured behavior.
    #[default]
    Default,
    /// Cache this read even if the engine is disabled.
    Cache,
    /// Do not cache this read.
    NoCache,
}

/// Extract a cache hint from the front of a statement.
///
/// Returns `(hint, remainder)` where `remainder` is the statement with the
/// hint comment removed. Unrecognized hint contents are treated as
/// [`CacheHint::Default`] and still stripped.
///
/// # Examples
///
/// ```
/// use relcache::hints::{extract_cache_hint, CacheHint};
///
/// let (hint, sql) = extract_cache_hint("/*+ NO_CACHE */ SELECT * FROM users");
/// assert_eq!(hint, CacheHint::NoCache);
/// assert_eq!(sql, "SELECT * FROM users");
/// ```
#[must_use]
pub fn extract_cache_hint(sql: &str) -> (CacheHint, &str) {
    let trimmed = sql.trim();

    if let Some(rest) = trimmed.strip_prefix("/*+") {
        if let Some(end) = rest.find("*/") {
            let hint = match rest[..end].trim().to_uppercase().as_str() {
                "CACHE" => CacheHint::Cache,
                "NO_CACHE" | "NOCACHE" => CacheHint::NoCache,
                _ => CacheHint::Default,
            };
            return (hint, rest[end + 2..].trim());
        }
    }

    (CacheHint::Default, trimmed)
}
