use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::cache::CacheStore;

/// Process-local TTL cache.
///
/// Backs the test suite and feature-less builds; expiry is enforced lazily
/// on access.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CachedValue>,
}

#[derive(Clone)]
struct CachedValue {
    value: String,
    expires_at: Instant,
}

impl CachedValue {
    fn live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn fetch(&self, key: &str) -> Option<String> {
        // The read guard must be gone before the expired-entry removal,
        // which takes a write lock on the same shard.
        let value = self
            .entries
            .get(key)
            .filter(|entry| entry.live())
            .map(|entry| entry.value.clone());
        if value.is_none() {
            self.entries.remove_if(key, |_, entry| !entry.live());
        }
        value
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> BoxFuture<'static, Option<String>> {
        let value = self.fetch(key);
        Box::pin(async move { value })
    }

    fn set(&self, key: &str, value: String, ttl: Duration) -> BoxFuture<'static, ()> {
        self.entries.insert(
            key.to_string(),
            CachedValue {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Box::pin(async {})
    }

    fn delete(&self, key: &str) -> BoxFuture<'static, bool> {
        let removed = self.entries.remove(key).is_some();
        Box::pin(async move { removed })
    }

    fn delete_by_prefix(&self, prefix: &str) -> BoxFuture<'static, u64> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before.saturating_sub(self.entries.len()) as u64;
        Box::pin(async move { removed })
    }

    fn exists(&self, key: &str) -> BoxFuture<'static, bool> {
        let found = self.fetch(key).is_some();
        Box::pin(async move { found })
    }

    fn increment(&self, key: &str, amount: i64) -> BoxFuture<'static, i64> {
        let mut entry = self.entries.entry(key.to_string()).or_insert(CachedValue {
            value: "0".to_string(),
            expires_at: Instant::now() + Duration::from_secs(24 * 3600),
        });
        let next = entry.value.parse::<i64>().unwrap_or(0) + amount;
        entry.value = next.to_string();
        drop(entry);
        Box::pin(async move { next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = MemoryCache::new();
        cache
            .set("top_leaderboard:10:0", "[1,2,3]".into(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("top_leaderboard:10:0").await.as_deref(), Some("[1,2,3]"));
        assert!(cache.exists("top_leaderboard:10:0").await);
        assert!(!cache.exists("top_leaderboard:10:1").await);
    }

    #[tokio::test]
    async fn expired_entries_read_as_misses() {
        let cache = MemoryCache::new();
        cache
            .set("user_rank:1", "{}".into(), Duration::from_millis(5))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("user_rank:1").await, None);
        assert!(!cache.exists("user_rank:1").await);
    }

    #[tokio::test]
    async fn expired_reads_return_promptly() {
        let cache = MemoryCache::new();
        cache
            .set("user_rank:9", "{}".into(), Duration::from_millis(1))
            .await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Reading an expired key both misses and evicts; neither step may
        // stall the caller.
        let read = tokio::time::timeout(Duration::from_secs(2), cache.get("user_rank:9")).await;
        assert_eq!(read.expect("expired read must not block"), None);
        let check = tokio::time::timeout(Duration::from_secs(2), cache.exists("user_rank:9"));
        assert!(!check.await.expect("expired exists must not block"));
    }

    #[tokio::test]
    async fn delete_by_prefix_only_touches_matching_keys() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("user_rank:1", "a".into(), ttl).await;
        cache.set("user_rank:2", "b".into(), ttl).await;
        cache.set("top_leaderboard:10:0", "c".into(), ttl).await;

        assert_eq!(cache.delete_by_prefix("user_rank:").await, 2);
        assert_eq!(cache.get("user_rank:1").await, None);
        assert!(cache.get("top_leaderboard:10:0").await.is_some());
    }

    #[tokio::test]
    async fn increment_accumulates() {
        let cache = MemoryCache::new();
        assert_eq!(cache.increment("submissions", 1).await, 1);
        assert_eq!(cache.increment("submissions", 4).await, 5);
    }
}
