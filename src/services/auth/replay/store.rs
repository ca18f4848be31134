use std::{future::Future, pin::Pin};

use crate::services::cache::CacheError;

/// Time-bounded set of proof identifiers that have already been accepted.
///
/// Implementations must make `check_and_store` a single atomic insert-if-absent:
/// two requests racing on the same identifier get exactly one `Ok(true)`.
pub trait ReplayStore: Send + Sync {
    // Atomically check whether `key` was already seen and store it with TTL.
    //
    // Returns:
    // - Ok(true)  => first time (stored successfully)
    // - Ok(false) => replay detected (already exists)
    // - Err(_)    => backend failure (caller must treat as rejection)
    fn check_and_store<'a>(
        &'a self,
        key: &'a str,
        ttl_secs: u64,
    ) -> Pin<Box<dyn Future<Output = Result<bool, ReplayError>> + Send + 'a>>;
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error(transparent)]
    Cache(#[from] CacheError),
}
