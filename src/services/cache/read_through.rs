//! Read-through cache for external read ports.
//!
//! - `get_or_compute` serves a stored entry while `expires_at > now`; otherwise it calls the
//!   compute function, stores the result with a fresh entity tag and reports a miss.
//! - Backing-store failures (errors, timeouts, undecodable entries) degrade to direct
//!   computation. Only availability fails open here; authorization runs before this layer.
//! - Concurrent misses on one key may each compute. Reads are idempotent, so the last
//!   writer simply wins.
use std::{future::Future, sync::Arc, time::Duration};

use base64::Engine as _;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::services::cache::client::{CacheClient, CacheError};

/// Stored form of a cached value. Written once on a miss, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub expires_at: DateTime<Utc>,
    pub entity_tag: String,
}

/// What a caller gets back from the cache.
#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub value: T,
    pub cache_hit: bool,
    pub entity_tag: String,
}

#[derive(Clone)]
pub struct ReadThroughCache {
    client: Arc<dyn CacheClient>,
    prefix: String,
    op_timeout: Duration,
}

impl std::fmt::Debug for ReadThroughCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadThroughCache")
            .field("backend", &self.client.backend_name())
            .field("prefix", &self.prefix)
            .field("op_timeout", &self.op_timeout)
            .finish()
    }
}

impl ReadThroughCache {
    pub fn new(client: Arc<dyn CacheClient>, prefix: impl Into<String>, op_timeout: Duration) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            op_timeout,
        }
    }

    pub fn key(&self, parts: &[&str]) -> String {
        let mut key = self.prefix.clone();
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }

    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: TimeDelta,
        now: DateTime<Utc>,
        compute: F,
    ) -> Result<Cached<T>, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(entry) = self.read::<T>(key).await
            && entry.expires_at > now
        {
            return Ok(Cached {
                value: entry.value,
                cache_hit: true,
                entity_tag: entry.entity_tag,
            });
        }

        let value = compute().await?;
        let entity_tag = entity_tag(&value)?;
        let entry = CacheEntry {
            value,
            expires_at: now + ttl,
            entity_tag,
        };
        self.write(key, &entry, ttl).await;

        Ok(Cached {
            value: entry.value,
            cache_hit: false,
            entity_tag: entry.entity_tag,
        })
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let raw = match tokio::time::timeout(self.op_timeout, self.client.get_string(key)).await {
            Ok(Ok(raw)) => raw?,
            Ok(Err(err)) => {
                warn!(error = ?err, backend = self.client.backend_name(), "cache read failed, computing directly");
                return None;
            }
            Err(_) => {
                warn!(backend = self.client.backend_name(), "cache read timed out, computing directly");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = ?err, key = %key, "undecodable cache entry, treating as miss");
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, key: &str, entry: &CacheEntry<T>, ttl: TimeDelta) {
        let raw = match serde_json::to_string(entry) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = ?err, key = %key, "cache entry not serializable, skipping store");
                return;
            }
        };
        let ttl = ttl.to_std().unwrap_or(Duration::ZERO);

        match tokio::time::timeout(self.op_timeout, self.client.set_with_ttl(key, &raw, ttl)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(error = ?err, backend = self.client.backend_name(), "cache write failed");
            }
            Err(_) => {
                warn!(backend = self.client.backend_name(), "cache write timed out");
            }
        }
    }
}

/// Quoted base64url(SHA-256) over the value's JSON form.
pub fn entity_tag<T: Serialize>(value: &T) -> Result<String, CacheError> {
    let bytes = serde_json::to_vec(value).map_err(|e| CacheError::InvalidValue(e.to_string()))?;
    Ok(quote_digest(&bytes))
}

/// Tag for a value derived from already-tagged data (e.g. one page of a cached list).
pub fn derive_tag(parts: &[&str]) -> String {
    quote_digest(parts.join("|").as_bytes())
}

fn quote_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!(
        "\"{}\"",
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
    )
}

/// `If-None-Match` evaluation (weak comparison, list and `*` forms).
pub fn if_none_match_matches(header: &str, current: &str) -> bool {
    let current = strip_weak(current.trim());
    header
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .any(|t| t == "*" || strip_weak(t) == current)
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    // 1-based
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total_records: u64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn next_page(&self) -> Option<u32> {
        (self.page < self.total_pages).then(|| self.page + 1)
    }
}

/// Slice one page out of the full result set. Out-of-range pages are empty, never errors.
pub fn paginate<T: Clone>(items: &[T], request: PageRequest) -> Page<T> {
    let page_size = request.page_size.max(1);
    let total = items.len();
    let offset = (request.page.max(1) as usize - 1).saturating_mul(page_size as usize);

    let slice = if offset >= total {
        Vec::new()
    } else {
        let end = offset.saturating_add(page_size as usize).min(total);
        items[offset..end].to_vec()
    };

    Page {
        items: slice,
        page: request.page,
        page_size,
        total_records: total as u64,
        total_pages: total.div_ceil(page_size as usize) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::{CacheResult, InMemoryCacheClient};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn now() -> DateTime<Utc> {
        "2026-02-09T10:15:30Z".parse().unwrap()
    }

    fn cache(client: Arc<dyn CacheClient>) -> ReadThroughCache {
        ReadThroughCache::new(client, "of:test", Duration::from_millis(200))
    }

    #[derive(Debug)]
    struct UnreachableCache;

    #[async_trait]
    impl CacheClient for UnreachableCache {
        fn backend_name(&self) -> &'static str {
            "unreachable"
        }
        async fn get_string(&self, _key: &str) -> CacheResult<Option<String>> {
            Err(CacheError::BackendConnection("connection refused".into()))
        }
        async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
            Err(CacheError::BackendConnection("connection refused".into()))
        }
        async fn set_if_absent_with_ttl(
            &self,
            _key: &str,
            _value: &str,
            _ttl: Duration,
        ) -> CacheResult<bool> {
            Err(CacheError::BackendConnection("connection refused".into()))
        }
    }

    async fn lookup(
        cache: &ReadThroughCache,
        at: DateTime<Utc>,
        calls: &AtomicUsize,
    ) -> Cached<Vec<String>> {
        cache
            .get_or_compute::<_, CacheError, _, _>("k", TimeDelta::seconds(30), at, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec!["POL-MTR-001".to_string(), "POL-MTR-002".to_string()])
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn miss_then_hit_then_miss_after_ttl() {
        let cache = cache(Arc::new(InMemoryCacheClient::new()));
        let calls = AtomicUsize::new(0);

        let first = lookup(&cache, now(), &calls).await;
        assert!(!first.cache_hit);

        let second = lookup(&cache, now() + TimeDelta::seconds(29), &calls).await;
        assert!(second.cache_hit);
        assert_eq!(second.entity_tag, first.entity_tag);
        assert_eq!(second.value, first.value);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // expires_at == now is already stale
        let third = lookup(&cache, now() + TimeDelta::seconds(30), &calls).await;
        assert!(!third.cache_hit);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreachable_store_degrades_to_direct_computation() {
        let cache = cache(Arc::new(UnreachableCache));
        let calls = AtomicUsize::new(0);

        let first = lookup(&cache, now(), &calls).await;
        let second = lookup(&cache, now(), &calls).await;

        assert!(!first.cache_hit);
        assert!(!second.cache_hit);
        assert_eq!(first.entity_tag, second.entity_tag);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let client = Arc::new(InMemoryCacheClient::new());
        client
            .set_with_ttl("k", "not json", Duration::from_secs(30))
            .await
            .unwrap();
        let cache = cache(client);
        let calls = AtomicUsize::new(0);

        assert!(!lookup(&cache, now(), &calls).await.cache_hit);
        assert!(lookup(&cache, now(), &calls).await.cache_hit);
    }

    #[tokio::test]
    async fn compute_errors_are_not_cached() {
        let cache = cache(Arc::new(InMemoryCacheClient::new()));

        let err = cache
            .get_or_compute::<Vec<String>, CacheError, _, _>("k", TimeDelta::seconds(30), now(), || async {
                Err(CacheError::Timeout)
            })
            .await;
        assert!(matches!(err, Err(CacheError::Timeout)));

        let calls = AtomicUsize::new(0);
        assert!(!lookup(&cache, now(), &calls).await.cache_hit);
    }

    #[test]
    fn entity_tag_is_deterministic_and_quoted() {
        let a = entity_tag(&vec!["x", "y"]).unwrap();
        let b = entity_tag(&vec!["x", "y"]).unwrap();
        let c = entity_tag(&vec!["y", "x"]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with('"') && a.ends_with('"'));
        assert_ne!(derive_tag(&[a.as_str(), "1", "10"]), derive_tag(&[a.as_str(), "2", "10"]));
    }

    #[test]
    fn if_none_match_forms() {
        let tag = "\"abc\"";
        assert!(if_none_match_matches("\"abc\"", tag));
        assert!(if_none_match_matches("W/\"abc\"", tag));
        assert!(if_none_match_matches("\"zzz\", \"abc\"", tag));
        assert!(if_none_match_matches("*", tag));
        assert!(!if_none_match_matches("\"abd\"", tag));
        assert!(!if_none_match_matches("", tag));
    }

    #[test]
    fn page_beyond_range_is_empty_with_true_total() {
        let items: Vec<u32> = (1..=2).collect();

        let first = paginate(&items, PageRequest { page: 1, page_size: 10 });
        assert_eq!(first.items, vec![1, 2]);
        assert_eq!(first.total_records, 2);
        assert_eq!(first.total_pages, 1);
        assert_eq!(first.next_page(), None);

        let beyond = paginate(&items, PageRequest { page: 5, page_size: 10 });
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total_records, 2);
    }

    #[test]
    fn pages_slice_in_order() {
        let items: Vec<u32> = (1..=5).collect();
        let second = paginate(&items, PageRequest { page: 2, page_size: 2 });
        assert_eq!(second.items, vec![3, 4]);
        assert_eq!(second.total_pages, 3);
        assert_eq!(second.next_page(), Some(3));

        let last = paginate(&items, PageRequest { page: 3, page_size: 2 });
        assert_eq!(last.items, vec![5]);
        assert_eq!(last.next_page(), None);

        let empty: Vec<u32> = Vec::new();
        let page = paginate(&empty, PageRequest { page: 1, page_size: 10 });
        assert_eq!(page.total_pages, 0);
        assert!(page.items.is_empty());
    }
}
