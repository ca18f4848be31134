use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use crate::services::{
    auth::replay::store::{ReplayError, ReplayStore},
    cache::CacheClient,
};

/// Replay store on top of any `CacheClient` (Valkey in production, in-memory in tests).
///
/// Fail-closed policy is implemented by returning `Err` on any backend error;
/// callers treat that as a rejected proof.
#[derive(Clone)]
pub struct CacheReplayStore {
    cache: Arc<dyn CacheClient>,
    // Key prefix to avoid collisions with the read-through cache and across environments
    prefix: String,
}

impl std::fmt::Debug for CacheReplayStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheReplayStore")
            .field("backend", &self.cache.backend_name())
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl CacheReplayStore {
    pub fn new(cache: Arc<dyn CacheClient>, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, raw: &str) -> String {
        format!("{}:{}", self.prefix, raw)
    }
}

impl ReplayStore for CacheReplayStore {
    fn check_and_store<'a>(
        &'a self,
        key: &'a str,
        ttl_secs: u64,
    ) -> Pin<Box<dyn Future<Output = Result<bool, ReplayError>> + Send + 'a>> {
        Box::pin(async move {
            let full_key = self.key(key);

            // SET <key> "1" NX EX <ttl>
            // - true when key is newly set
            // - false when key already exists
            let res = self
                .cache
                .set_if_absent_with_ttl(&full_key, "1", Duration::from_secs(ttl_secs))
                .await?;

            Ok(res)
        })
    }
}
