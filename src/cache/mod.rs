//! Best-effort cache layered over the storage-backed source of truth.
//!
//! Every implementation of [`CacheStore`] degrades silently: a connectivity
//! failure yields the empty/negative value instead of an error, so read
//! paths fall back to storage and write paths are never blocked by the
//! cache. Failures are logged, never surfaced.

/// In-memory TTL cache.
pub mod memory;
#[cfg(feature = "redis-cache")]
/// Redis-backed cache.
pub mod redis;

use std::time::Duration;

use futures::future::BoxFuture;

/// Prefix of cached top-N pages; invalidated wholesale on every submission.
pub const TOP_LEADERBOARD_PREFIX: &str = "top_leaderboard:";
/// Prefix of cached per-player rank views; invalidated wholesale on every
/// submission, since one score can shift every rank.
pub const USER_RANK_PREFIX: &str = "user_rank:";

/// Cache key for one top-N page.
pub fn top_leaderboard_key(limit: usize, offset: usize) -> String {
    format!("{TOP_LEADERBOARD_PREFIX}{limit}:{offset}")
}

/// Cache key for one player's rank view.
pub fn user_rank_key(player_id: i64) -> String {
    format!("{USER_RANK_PREFIX}{player_id}")
}

/// TTL-bounded key-value cache with prefix invalidation.
///
/// Values are JSON strings. All operations are best-effort and must not
/// propagate errors; the rest of the system stays agnostic to whether a
/// cache is present, reachable, or disabled.
pub trait CacheStore: Send + Sync {
    /// Fetch a value, `None` on miss, expiry, or failure.
    fn get(&self, key: &str) -> BoxFuture<'static, Option<String>>;
    /// Store a value with the given TTL.
    fn set(&self, key: &str, value: String, ttl: Duration) -> BoxFuture<'static, ()>;
    /// Remove a single key; `true` when something was deleted.
    fn delete(&self, key: &str) -> BoxFuture<'static, bool>;
    /// Remove every key starting with `prefix`, returning how many went.
    fn delete_by_prefix(&self, prefix: &str) -> BoxFuture<'static, u64>;
    /// Whether the key currently exists.
    fn exists(&self, key: &str) -> BoxFuture<'static, bool>;
    /// Atomically add `amount` to a counter, returning the new value
    /// (`0` on failure).
    fn increment(&self, key: &str, amount: i64) -> BoxFuture<'static, i64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_by_concern() {
        assert_eq!(top_leaderboard_key(100, 0), "top_leaderboard:100:0");
        assert_eq!(user_rank_key(7), "user_rank:7");
        assert!(top_leaderboard_key(10, 20).starts_with(TOP_LEADERBOARD_PREFIX));
        assert!(user_rank_key(1).starts_with(USER_RANK_PREFIX));
    }
}
