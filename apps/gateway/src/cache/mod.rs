//! Resolved-share cache keyed by short-URL id.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::config::CacheConfig;
use crate::models::ResolvedShare;

#[async_trait]
pub trait ShareCache: Send + Sync {
    async fn get(&self, short_url_id: &str) -> Option<ResolvedShare>;
    async fn put(&self, share: ResolvedShare);
}

struct CachedShare {
    share: ResolvedShare,
    inserted: Instant,
}

/// In-process cache with a TTL and a bound on entry count. At the bound the
/// oldest entry is evicted.
pub struct MemoryShareCache {
    ttl: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<String, CachedShare>>,
}

impl MemoryShareCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_seconds), config.max_entries)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl ShareCache for MemoryShareCache {
    async fn get(&self, short_url_id: &str) -> Option<ResolvedShare> {
        {
            let entries = self.entries.read().await;
            match entries.get(short_url_id) {
                Some(cached) if cached.inserted.elapsed() < self.ttl => {
                    return Some(cached.share.clone())
                }
                Some(_) => {}
                None => return None,
            }
        }

        self.entries.write().await.remove(short_url_id);
        tracing::debug!("Cached share {} expired", short_url_id);
        None
    }

    async fn put(&self, share: ResolvedShare) {
        let key = share.reference.short_url_id.clone();
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, cached)| cached.inserted)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CachedShare {
                share,
                inserted: Instant::now(),
            },
        );
    }
}

/// Used when caching is disabled in config.
pub struct NoopShareCache;

#[async_trait]
impl ShareCache for NoopShareCache {
    async fn get(&self, _short_url_id: &str) -> Option<ResolvedShare> {
        None
    }

    async fn put(&self, _share: ResolvedShare) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShareReference;

    fn share(id: &str) -> ResolvedShare {
        ResolvedShare {
            reference: ShareReference::new(id),
            user_key: "1".to_string(),
            share_id: "2".to_string(),
            entries: Vec::new(),
            upstream: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = MemoryShareCache::new(Duration::from_secs(60), 10);
        assert!(cache.get("abc").await.is_none());

        cache.put(share("abc")).await;
        let cached = cache.get("abc").await.unwrap();
        assert_eq!(cached.reference.short_url_id, "abc");
        assert_eq!(cached.share_id, "2");
    }

    #[tokio::test]
    async fn test_expired_entries_are_dropped() {
        let cache = MemoryShareCache::new(Duration::from_millis(20), 10);
        cache.put(share("abc")).await;

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(cache.get("abc").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_oldest_entry_is_evicted() {
        let cache = MemoryShareCache::new(Duration::from_secs(60), 2);
        cache.put(share("a")).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.put(share("b")).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.put(share("c")).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("a").await.is_none());
        assert!(cache.get("b").await.is_some());
        assert!(cache.get("c").await.is_some());
    }

    #[tokio::test]
    async fn test_replacing_existing_key_does_not_evict() {
        let cache = MemoryShareCache::new(Duration::from_secs(60), 2);
        cache.put(share("a")).await;
        cache.put(share("b")).await;
        cache.put(share("b")).await;

        assert!(cache.get("a").await.is_some());
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_noop_cache() {
        let cache = NoopShareCache;
        cache.put(share("a")).await;
        assert!(cache.get("a").await.is_none());
    }
}
