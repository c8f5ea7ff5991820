//! Cache configuration.

use std::time::Duration;

/// Configuration for the cache engine and its store driver.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether caching is enabled.
    /// Default: true
    pub enabled: bool,

    /// Store driver name: "memory", "redis", or "null".
    /// Unknown names resolve to the null store with a logged warning.
    /// Default: "memory"
    pub driver: String,

    /// Maximum number of entries in the bounded in-process store.
    /// Default: 1000
    pub max_entries: usize,

    /// Time-to-live for remote-tier entries (redis driver only).
    /// Default: 1 hour
    pub ttl: Duration,

    /// Whether per-operation cache traffic is logged at debug level.
    /// Connection-level failures are logged regardless of this flag.
    /// Default: false
    pub logging: bool,

    /// Connection identifier for the remote tier (redis driver only).
    /// Default: "redis://127.0.0.1:6379/"
    pub redis_url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            driver: "memory".to_string(),
            max_entries: 1000,
            ttl: Duration::from_secs(3600),
            logging: false,
            redis_url: "redis://127.0.0.1:6379/".to_string(),
        }
    }
}

impl CacheConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the cache.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Select the store driver by name.
    #[must_use]
    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    /// Set the maximum number of entries for the bounded store.
    #[must_use]
    pub const fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set the TTL for remote-tier entries.
    #[must_use]
    pub const fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable per-operation debug logging.
    #[must_use]
    pub const fn logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    /// Set the remote-tier connection identifier.
    #[must_use]
    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    /// Create a configuration for a disabled cache (null driver).
    #[must_use]
    pub fn disabled() -> Self {
        Self { enabled: false, driver: "null".to_string(), ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.driver, "memory");
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.ttl, Duration::from_secs(3600));
        assert!(!config.logging);
    }

    #[test]
    fn test_builder() {
        let config = CacheConfig::new()
            .driver("redis")
            .max_entries(50)
            .ttl(Duration::from_secs(60))
            .logging(true)
            .redis_url("redis://cache.internal:6380/2");

        assert_eq!(config.driver, "redis");
        assert_eq!(config.max_entries, 50);
        assert_eq!(config.ttl, Duration::from_secs(60));
        assert!(config.logging);
        assert_eq!(config.redis_url, "redis://cache.internal:6380/2");
    }

    #[test]
    fn test_disabled() {
        let config = CacheConfig::disabled();
        assert!(!config.enabled);
        assert_eq!(config.driver, "null");
    }
}
