use std::{future::Future, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use redis::{AsyncCommands, Client, RedisResult, aio::ConnectionManager};
use tokio::{sync::RwLock, time::timeout};
use tracing::warn;

use crate::cache::CacheStore;

/// Redis-backed cache.
///
/// The connection is established lazily and re-established after any
/// failure; every operation carries its own timeout so a slow or down Redis
/// degrades latency, never correctness.
#[derive(Clone)]
pub struct RedisCache {
    inner: Arc<RedisInner>,
}

struct RedisInner {
    client: Client,
    prefix: String,
    op_timeout: Duration,
    manager: RwLock<Option<ConnectionManager>>,
}

impl RedisCache {
    /// Prepare a cache client for `url`. No connection is attempted here;
    /// the first operation connects on demand.
    pub fn new(url: &str, prefix: &str, op_timeout: Duration) -> RedisResult<Self> {
        let client = Client::open(url)?;
        Ok(Self {
            inner: Arc::new(RedisInner {
                client,
                prefix: prefix.to_string(),
                op_timeout,
                manager: RwLock::new(None),
            }),
        })
    }
}

impl RedisInner {
    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn connection(&self) -> Option<ConnectionManager> {
        if let Some(manager) = self.manager.read().await.as_ref().cloned() {
            return Some(manager);
        }

        let mut slot = self.manager.write().await;
        if let Some(manager) = slot.as_ref().cloned() {
            return Some(manager);
        }
        match timeout(self.op_timeout, self.client.get_connection_manager()).await {
            Ok(Ok(manager)) => {
                *slot = Some(manager.clone());
                Some(manager)
            }
            Ok(Err(err)) => {
                warn!(error = %err, "redis connection failed");
                None
            }
            Err(_) => {
                warn!("redis connection timed out");
                None
            }
        }
    }

    async fn drop_connection(&self) {
        self.manager.write().await.take();
    }

    /// Await `operation` under the configured timeout, degrading to `None`
    /// and discarding the connection on any failure.
    async fn run<T>(
        &self,
        op: &str,
        key: &str,
        operation: impl Future<Output = RedisResult<T>>,
    ) -> Option<T> {
        match timeout(self.op_timeout, operation).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                warn!(op, key, error = %err, "cache operation failed");
                self.drop_connection().await;
                None
            }
            Err(_) => {
                warn!(op, key, "cache operation timed out");
                self.drop_connection().await;
                None
            }
        }
    }
}

impl CacheStore for RedisCache {
    fn get(&self, key: &str) -> BoxFuture<'static, Option<String>> {
        let inner = self.inner.clone();
        let key = inner.key(key);
        Box::pin(async move {
            let mut conn = inner.connection().await?;
            inner
                .run("get", &key, conn.get::<_, Option<String>>(&key))
                .await
                .flatten()
        })
    }

    fn set(&self, key: &str, value: String, ttl: Duration) -> BoxFuture<'static, ()> {
        let inner = self.inner.clone();
        let key = inner.key(key);
        Box::pin(async move {
            let Some(mut conn) = inner.connection().await else {
                return;
            };
            inner
                .run(
                    "set",
                    &key,
                    conn.set_ex::<_, _, ()>(&key, value, ttl.as_secs()),
                )
                .await;
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'static, bool> {
        let inner = self.inner.clone();
        let key = inner.key(key);
        Box::pin(async move {
            let Some(mut conn) = inner.connection().await else {
                return false;
            };
            inner
                .run("delete", &key, conn.del::<_, i64>(&key))
                .await
                .is_some_and(|removed| removed > 0)
        })
    }

    fn delete_by_prefix(&self, prefix: &str) -> BoxFuture<'static, u64> {
        let inner = self.inner.clone();
        let pattern = format!("{}*", inner.key(prefix));
        Box::pin(async move {
            let Some(mut conn) = inner.connection().await else {
                return 0;
            };
            let Some(keys) = inner
                .run("keys", &pattern, conn.keys::<_, Vec<String>>(&pattern))
                .await
            else {
                return 0;
            };
            if keys.is_empty() {
                return 0;
            }
            inner
                .run("delete_by_prefix", &pattern, conn.del::<_, i64>(keys))
                .await
                .map_or(0, |removed| removed.max(0) as u64)
        })
    }

    fn exists(&self, key: &str) -> BoxFuture<'static, bool> {
        let inner = self.inner.clone();
        let key = inner.key(key);
        Box::pin(async move {
            let Some(mut conn) = inner.connection().await else {
                return false;
            };
            inner
                .run("exists", &key, conn.exists::<_, bool>(&key))
                .await
                .unwrap_or(false)
        })
    }

    fn increment(&self, key: &str, amount: i64) -> BoxFuture<'static, i64> {
        let inner = self.inner.clone();
        let key = inner.key(key);
        Box::pin(async move {
            let Some(mut conn) = inner.connection().await else {
                return 0;
            };
            inner
                .run("increment", &key, conn.incr::<_, _, i64>(&key, amount))
                .await
                .unwrap_or(0)
        })
    }
}
