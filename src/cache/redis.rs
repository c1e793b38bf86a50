//! Redis cache backend.
//!
//! Entries are plain byte strings. TTL is enforced by redis itself: a write
//! is a `MULTI / SET / EXPIRE / EXEC` pipeline, so an entry never exists
//! without its expiry. Reads trust the store and report no write time.
//!
//! The connection is opened lazily on first use and shared through a
//! [`ConnectionManager`], which reconnects on its own. A redis outage
//! therefore never blocks startup; every operation is bounded by a timeout
//! and its failure degrades to a cache miss upstream.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;
use tracing::debug;

use super::store::{CacheStore, StoredEntry};
use crate::config::RedisSettings;
use crate::{MimirError, Result};

/// Cache entries in a redis instance.
pub struct RedisStore {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    timeout: Duration,
}

impl RedisStore {
    /// Create a store; no connection is made until the first operation.
    pub fn new(settings: &RedisSettings) -> Result<Self> {
        let client = redis::Client::open(settings.url()).map_err(|e| {
            MimirError::Configuration(format!("invalid redis settings: {e}"))
        })?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
            timeout: Duration::from_millis(settings.timeout_ms),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        self.connection
            .get_or_try_init(|| async {
                debug!("opening redis connection");
                self.bounded("connect", self.client.get_connection_manager())
                    .await
            })
            .await
            .cloned()
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(MimirError::Cache(format!("redis {operation} failed: {e}"))),
            Err(_) => Err(MimirError::Cache(format!(
                "redis {operation} timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

/// Redis `EXPIRE` takes whole seconds; anything shorter rounds up to one.
fn expiry_secs(ttl: Duration) -> i64 {
    ttl.as_secs().max(1) as i64
}

#[async_trait]
impl CacheStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    /// `SET` and `EXPIRE` go out in one atomic pipeline.
    fn put_sets_expiry(&self) -> bool {
        true
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        self.bounded("exists", conn.exists(key)).await
    }

    async fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = self.bounded("get", conn.get(key)).await?;
        Ok(value.map(|payload| StoredEntry {
            payload,
            written_at: None,
        }))
    }

    async fn put(&self, key: &str, payload: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(key, payload)
            .ignore()
            .expire(key, expiry_secs(ttl))
            .ignore();
        let _: () = self.bounded("put", pipe.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: i64 = self
            .bounded("expire", conn.expire(key, expiry_secs(ttl)))
            .await?;
        Ok(())
    }
}
