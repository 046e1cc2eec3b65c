//! Metadata cache adapters.
//!
//! Derived, volatile state: read-through caches and search-index metadata.
//! Absence is never an error and failures must never fail a request;
//! callers log and count them.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use mirador_core::{CoreError, Result};
use parking_lot::Mutex;

/// Default capacity for the in-process cache.
pub const DEFAULT_MEMORY_CACHE_CAPACITY: usize = 10_000;

/// Key-value cache with per-entry TTLs.
#[async_trait]
pub trait MetadataCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    /// Delete a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Trait-object alias used across engine state.
pub type DynMetadataCache = dyn MetadataCache;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process LRU cache with TTL checked on read.
///
/// The default cache for development; production deployments point
/// [`RedisCache`] at the cache daemon instead.
pub struct MemoryCache {
    inner: Mutex<LruCache<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut cache = self.inner.lock();
        match cache.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                cache.pop(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.inner.lock().put(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.inner.lock().pop(key).is_some())
    }
}

/// Cache client for a Redis-protocol cache daemon.
#[derive(Clone)]
pub struct RedisCache {
    manager: redis::aio::ConnectionManager,
}

impl RedisCache {
    /// Connect to the cache daemon at `url` (e.g. `redis://cache:6379`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| CoreError::Cache(format!("invalid cache url: {e}")))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| CoreError::Cache(format!("cache connect failed: {e}")))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl MetadataCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CoreError::Cache(format!("cache get failed: {e}")))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        let secs = ttl.as_secs().max(1);
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(secs)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| CoreError::Cache(format!("cache set failed: {e}")))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CoreError::Cache(format!("cache delete failed: {e}")))?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_cache_round_trip() {
        let cache = MemoryCache::new();
        cache
            .set("kpi:def:k1", "{\"id\":\"k1\"}", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            cache.get("kpi:def:k1").await.unwrap().as_deref(),
            Some("{\"id\":\"k1\"}")
        );
        assert!(cache.delete("kpi:def:k1").await.unwrap());
        assert!(!cache.delete("kpi:def:k1").await.unwrap());
        assert_eq!(cache.get("kpi:def:k1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_cache_expires() {
        let cache = MemoryCache::new();
        cache
            .set("short", "v", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_cache_evicts_at_capacity() {
        let cache = MemoryCache::with_capacity(2);
        for i in 0..3 {
            cache
                .set(&format!("k{i}"), "v", Duration::from_secs(60))
                .await
                .unwrap();
        }
        // k0 is the least recently used entry
        assert_eq!(cache.get("k0").await.unwrap(), None);
        assert!(cache.get("k2").await.unwrap().is_some());
    }
}
