//! Response caching subsystem.
//!
//! - [`CacheStore`]: backend-agnostic byte store with TTLs, implemented by
//!   [`FileStore`] (mtime judged at read time), [`RedisStore`] (store-native
//!   expiry) and [`MemoryStore`] (in-process, bounded).
//!
//! - [`DatasourceCache`]: per-datasource view over the shared store.
//!
//! Files are checked lazily against their mtime; redis entries vanish when
//! their `EXPIRE` fires.

pub mod datasource;
pub mod file;
pub mod memory;
pub mod redis;
pub mod store;

pub use datasource::{CacheLayer, CacheLookup, CacheStatus, DatasourceCache, cache_key, is_fresh};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use self::redis::RedisStore;
pub use store::{CacheStore, StoredEntry};

use std::sync::Arc;

use tracing::info;

use crate::Result;
use crate::clock::Clock;
use crate::config::{CacheBackend, CachingSettings};

/// Open the backend selected by `settings`, or `None` when caching has no
/// backend configured.
pub fn open_store(
    settings: &CachingSettings,
    clock: Arc<dyn Clock>,
) -> Result<Option<Arc<dyn CacheStore>>> {
    let store: Arc<dyn CacheStore> = match settings.backend() {
        CacheBackend::Redis => {
            info!(host = %settings.redis.host, port = settings.redis.port, "using redis cache");
            Arc::new(RedisStore::new(&settings.redis)?)
        }
        CacheBackend::Memory => {
            info!(max_entries = settings.memory.max_entries, "using in-process cache");
            Arc::new(MemoryStore::new(settings.memory.max_entries, clock))
        }
        CacheBackend::File => {
            info!(path = %settings.directory.path.display(), "using filesystem cache");
            Arc::new(
                FileStore::new(&settings.directory.path, &settings.directory.extension)?
                    .with_clock(clock),
            )
        }
        CacheBackend::None => return Ok(None),
    };
    Ok(Some(store))
}
