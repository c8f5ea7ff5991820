//! Error types for `relcache`.
//!
//! This module provides the [`CacheError`] type that represents all
//! possible errors raised inside the cache layer. Callers of the façade
//! normally never see these: the engine fails open, degrading to miss
//! behavior and logging the error instead.

use thiserror::Error;

/// Errors that can occur inside the cache layer.
///
/// These surface from store drivers; the façade converts them into
/// miss/best-effort behavior rather than propagating them to the read path.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A remote-tier command or connection failed.
    #[error("remote store error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A payload or parameter list could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compressing or decompressing a payload failed.
    #[error("compression error: {0}")]
    Compression(#[from] std::io::Error),

    /// A configuration value was invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// An internal lock was poisoned (a thread panicked while holding it).
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),
}

impl CacheError {
    /// Returns `true` if this error indicates the remote tier is unreachable
    /// (connection refused, dropped, or I/O failure) as opposed to an
    /// isolated command failure.
    ///
    /// Connection-level failures are logged unconditionally, regardless of
    /// the configured logging flag.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Redis(err) => {
                err.is_connection_refusal()
                    || err.is_connection_dropped()
                    || err.is_io_error()
                    || err.is_timeout()
            }
            _ => false,
        }
    }

    /// Returns `true` if this error came from decoding a stored payload.
    #[must_use]
    pub const fn is_payload(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::Compression(_))
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a lock poisoned error.
    #[must_use]
    pub fn lock_poisoned(msg: impl Into<String>) -> Self {
        Self::LockPoisoned(msg.into())
    }
}

/// A specialized `Result` type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
