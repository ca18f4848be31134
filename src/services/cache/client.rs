//! Cache client interface used by higher-level services (DPoP replay guard, read-through cache).
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-layer errors (transport/command/serialization).
///
/// Note:
/// - We keep this independent from `AppError` so callers can decide how to fail
///   (fail-closed for replay protection, fail-open for cached reads).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    BackendConnection(String),
    #[error("cache command error: {0}")]
    BackendCommand(String),
    #[error("cache value error: {0}")]
    InvalidValue(String),
    #[error("cache operation timed out")]
    Timeout,
}

/// A minimal, string-based cache interface.
///
/// - Replay protection needs `SET NX` + TTL.
/// - The read-through cache needs `GET` and `SET` + TTL (values are JSON documents).
///
/// Implementations are shared behind `Arc<dyn CacheClient>`.
#[async_trait]
pub trait CacheClient: Send + Sync + 'static {
    // Returns the cache backend name (for logging).
    fn backend_name(&self) -> &'static str;

    // Get UTF-8 string value.
    async fn get_string(&self, key: &str) -> CacheResult<Option<String>>;

    // Set (overwrite) value with TTL.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    // Set value if the key does not exist, with TTL.
    //
    // Returns:
    // - `Ok(true)`  if the key was set (not seen before)
    // - `Ok(false)` if the key already exists
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<bool>;
}

/// Backends expire on whole seconds; anything shorter would never be stored.
pub fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
