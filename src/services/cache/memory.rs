use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use crate::services::cache::client::{CacheClient, CacheResult, ttl_seconds};

// Sweep expired entries once the map has grown by this many writes.
const SWEEP_EVERY: usize = 1024;

/// Process-local cache client (tests, single-node development).
///
/// All operations take one mutex, so `set_if_absent_with_ttl` is an atomic
/// check-and-set. Expired entries are dropped lazily on access and swept periodically.
#[derive(Debug, Default)]
pub struct InMemoryCacheClient {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, (String, Instant)>,
    writes_since_sweep: usize,
}

impl Inner {
    fn live(&mut self, key: &str, now: Instant) -> Option<&String> {
        let expired = matches!(self.entries.get(key), Some((_, exp)) if *exp <= now);
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|(v, _)| v)
    }

    fn insert(&mut self, key: &str, value: &str, ttl: Duration, now: Instant) {
        self.writes_since_sweep += 1;
        if self.writes_since_sweep >= SWEEP_EVERY {
            self.entries.retain(|_, (_, exp)| *exp > now);
            self.writes_since_sweep = 0;
        }
        let expires_at = now + Duration::from_secs(ttl_seconds(ttl));
        self.entries
            .insert(key.to_string(), (value.to_string(), expires_at));
    }
}

impl InMemoryCacheClient {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CacheClient for InMemoryCacheClient {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.lock().live(key, Instant::now()).cloned())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.lock().insert(key, value, ttl, Instant::now());
        Ok(())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<bool> {
        let now = Instant::now();
        let mut inner = self.lock();
        if inner.live(key, now).is_some() {
            return Ok(false);
        }
        inner.insert(key, value, ttl, now);
        Ok(true)
    }
}
