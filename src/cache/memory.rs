//! In-process cache backend.
//!
//! Bounded LRU (moka) owned by one process. Behaves like the redis backend
//! from the caller's point of view: the store enforces each entry's TTL
//! itself and reports no write time. Expiry is judged against the injected
//! [`Clock`] at read time rather than by moka's own timer, so the entry's
//! TTL can differ per datasource.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use moka::future::Cache;

use super::store::{CacheStore, StoredEntry};
use crate::Result;
use crate::clock::Clock;

/// Default maximum number of entries.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

#[derive(Clone)]
struct MemoryEntry {
    payload: Arc<Vec<u8>>,
    written_at: SystemTime,
    ttl: Duration,
}

impl MemoryEntry {
    fn is_fresh(&self, now: SystemTime) -> bool {
        super::is_fresh(self.written_at, now, self.ttl)
    }
}

/// Cache entries in process memory.
pub struct MemoryStore {
    entries: Cache<String, MemoryEntry>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(max_entries: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Cache::new(max_entries),
            clock,
        }
    }

    async fn fresh_entry(&self, key: &str) -> Option<MemoryEntry> {
        let entry = self.entries.get(key).await?;
        if entry.is_fresh(self.clock.now()) {
            Some(entry)
        } else {
            self.entries.invalidate(key).await;
            None
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn put_sets_expiry(&self) -> bool {
        true
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.fresh_entry(key).await.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        Ok(self.fresh_entry(key).await.map(|entry| StoredEntry {
            payload: entry.payload.as_ref().clone(),
            written_at: None,
        }))
    }

    async fn put(&self, key: &str, payload: &[u8], ttl: Duration) -> Result<()> {
        let entry = MemoryEntry {
            payload: Arc::new(payload.to_vec()),
            written_at: self.clock.now(),
            ttl,
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<()> {
        if let Some(mut entry) = self.fresh_entry(key).await {
            entry.ttl = ttl;
            self.entries.insert(key.to_string(), entry).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn entry_expires_by_clock() {
        let clock = Arc::new(ManualClock::at_epoch_secs(1_000));
        let store = MemoryStore::new(DEFAULT_MAX_ENTRIES, clock.clone());

        store.put("k", b"v", Duration::from_secs(5)).await.unwrap();
        clock.advance(Duration::from_secs(4));
        assert_eq!(store.get("k").await.unwrap().unwrap().payload, b"v");

        clock.advance(Duration::from_secs(2));
        assert!(store.get("k").await.unwrap().is_none());
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn set_expiry_extends_entry() {
        let clock = Arc::new(ManualClock::at_epoch_secs(1_000));
        let store = MemoryStore::new(DEFAULT_MAX_ENTRIES, clock.clone());

        store.put("k", b"v", Duration::from_secs(5)).await.unwrap();
        store.set_expiry("k", Duration::from_secs(60)).await.unwrap();
        clock.advance(Duration::from_secs(30));
        assert!(store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn set_expiry_on_missing_key_is_ok() {
        let store = MemoryStore::new(DEFAULT_MAX_ENTRIES, Arc::new(ManualClock::at_epoch_secs(0)));
        store.set_expiry("missing", Duration::from_secs(5)).await.unwrap();
    }
}
