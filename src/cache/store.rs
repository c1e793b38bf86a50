//! Backend-agnostic key/value + TTL store.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::Result;

/// Raw bytes read back from a [`CacheStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub payload: Vec<u8>,
    /// When the entry was written, for backends that leave freshness to the
    /// reader (filesystem). `None` when the store enforces TTL itself.
    pub written_at: Option<SystemTime>,
}

/// A place to keep cached payloads.
///
/// A missing entry is `Ok(None)` / `Ok(false)`, never an error. Errors mean
/// the backend itself failed; callers degrade those to a cache miss.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Backend name for diagnostics ("file", "redis", "memory").
    fn backend(&self) -> &'static str;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<StoredEntry>>;

    /// Whether [`put`](Self::put) already applies `ttl`, making a following
    /// [`set_expiry`](Self::set_expiry) redundant.
    fn put_sets_expiry(&self) -> bool {
        false
    }

    /// Write `payload` atomically: concurrent readers see the old entry or the
    /// new one, never a partial write.
    async fn put(&self, key: &str, payload: &[u8], ttl: Duration) -> Result<()>;

    /// Set the TTL of an existing entry. No-op for backends that judge
    /// freshness at read time.
    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<()>;
}
