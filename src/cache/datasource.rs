//! Per-datasource façade over a [`CacheStore`].
//!
//! Decides whether caching applies to a request, derives the cache key,
//! checks freshness, and (de)serializes payloads. Backend failures never
//! escape this type: a failed read is a miss, a failed write is skipped,
//! both logged and counted.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use serde_json::Value;
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use super::store::CacheStore;
use crate::clock::Clock;
use crate::telemetry;
use crate::types::{DatasourceSchema, RequestContext, SourceType};

/// Process-wide cache settings and the shared store, handed to every
/// [`DatasourceCache`].
#[derive(Clone)]
pub struct CacheLayer {
    /// Global caching switch.
    pub enabled: bool,
    /// TTL used when a datasource does not set its own.
    pub default_ttl: Duration,
    pub store: Option<Arc<dyn CacheStore>>,
    pub clock: Arc<dyn Clock>,
}

impl CacheLayer {
    /// A layer that never caches.
    pub fn disabled(clock: Arc<dyn Clock>) -> Self {
        Self {
            enabled: false,
            default_ttl: Duration::ZERO,
            store: None,
            clock,
        }
    }
}

/// Outcome of a cache lookup, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Caching does not apply to this request.
    Bypassed,
    Hit { backend: &'static str },
    /// Absent, stale, corrupt, or the backend failed.
    Miss { backend: &'static str },
}

impl CacheStatus {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheStatus::Hit { .. })
    }

    /// Backend consulted, if any.
    pub fn source(&self) -> Option<&'static str> {
        match self {
            CacheStatus::Bypassed => None,
            CacheStatus::Hit { backend } | CacheStatus::Miss { backend } => Some(backend),
        }
    }
}

impl Serialize for CacheStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Diagnostics {
            hit: bool,
            #[serde(skip_serializing_if = "Option::is_none")]
            source: Option<&'static str>,
        }
        Diagnostics {
            hit: self.is_hit(),
            source: self.source(),
        }
        .serialize(serializer)
    }
}

/// Result of [`DatasourceCache::get_from_cache`].
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub value: Option<Value>,
    pub status: CacheStatus,
}

impl CacheLookup {
    fn miss(status: CacheStatus) -> Self {
        Self {
            value: None,
            status,
        }
    }
}

/// Deterministic cache key: hex SHA-1 of datasource name and resolved
/// endpoint (query string included).
pub fn cache_key(datasource: &str, endpoint: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(datasource.as_bytes());
    hasher.update(b"\0");
    hasher.update(endpoint.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether an entry written at `written_at` is still fresh at `now`.
///
/// An entry stamped after `now` (clock stepped back, directory copied from
/// another host) has no trustworthy age and counts as stale.
pub fn is_fresh(written_at: SystemTime, now: SystemTime, ttl: Duration) -> bool {
    match now.duration_since(written_at) {
        Ok(age) => age < ttl,
        Err(_) => false,
    }
}

/// Cache view for one datasource.
#[derive(Clone)]
pub struct DatasourceCache {
    name: String,
    source_type: SourceType,
    enabled: bool,
    ttl: Duration,
    layer: CacheLayer,
}

impl DatasourceCache {
    pub fn new(schema: &DatasourceSchema, layer: CacheLayer) -> Self {
        let ttl = schema
            .caching
            .ttl
            .map(Duration::from_secs)
            .unwrap_or(layer.default_ttl);
        Self {
            name: schema.name.clone(),
            source_type: schema.source_type(),
            enabled: schema.caching.enabled,
            ttl,
            layer,
        }
    }

    /// TTL applied to this datasource's entries.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Key for this datasource at `endpoint`.
    pub fn key(&self, endpoint: &str) -> String {
        cache_key(&self.name, endpoint)
    }

    /// Whether caching applies to `request`. Checked in order, first `false`
    /// wins: global switch, datasource switch, not a static source, no
    /// bypass on the request. A store must also be configured.
    pub fn caching_enabled(&self, request: &RequestContext) -> bool {
        self.layer.enabled
            && self.enabled
            && self.source_type != SourceType::Static
            && !request.bypasses_cache()
            && self.layer.store.is_some()
            && !self.ttl.is_zero()
    }

    /// Read a cached payload.
    ///
    /// Disabled caching is a permanent miss that never touches the store.
    /// Entries carrying a write time are checked against the TTL; stale,
    /// corrupt and unreadable entries are misses.
    pub async fn get_from_cache(&self, key: &str, request: &RequestContext) -> CacheLookup {
        if !self.caching_enabled(request) {
            return CacheLookup::miss(CacheStatus::Bypassed);
        }
        let Some(store) = self.layer.store.as_ref() else {
            return CacheLookup::miss(CacheStatus::Bypassed);
        };
        let backend = store.backend();
        let miss = CacheStatus::Miss { backend };

        let entry = match store.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.count_miss(backend);
                return CacheLookup::miss(miss);
            }
            Err(e) => {
                warn!(datasource = %self.name, backend, error = %e, "cache read failed, fetching live");
                metrics::counter!(telemetry::CACHE_ERRORS_TOTAL,
                    "backend" => backend,
                    "operation" => "get",
                )
                .increment(1);
                self.count_miss(backend);
                return CacheLookup::miss(miss);
            }
        };

        if let Some(written_at) = entry.written_at {
            if !is_fresh(written_at, self.layer.clock.now(), self.ttl) {
                debug!(datasource = %self.name, backend, "cache entry is stale");
                self.count_miss(backend);
                return CacheLookup::miss(miss);
            }
        }

        match serde_json::from_slice::<Value>(&entry.payload) {
            Ok(value) => {
                debug!(datasource = %self.name, backend, "cache hit");
                metrics::counter!(telemetry::CACHE_HITS_TOTAL,
                    "datasource" => self.name.clone(),
                    "backend" => backend,
                )
                .increment(1);
                CacheLookup {
                    value: Some(value),
                    status: CacheStatus::Hit { backend },
                }
            }
            Err(e) => {
                warn!(datasource = %self.name, backend, error = %e, "corrupt cache entry ignored");
                self.count_miss(backend);
                CacheLookup::miss(miss)
            }
        }
    }

    /// Store a payload. No-op when caching does not apply to `request`.
    pub async fn cache_response(&self, key: &str, value: &Value, request: &RequestContext) {
        if !self.caching_enabled(request) {
            return;
        }
        let Some(store) = self.layer.store.as_ref() else {
            return;
        };
        let backend = store.backend();

        let payload = match serde_json::to_vec(value) {
            Ok(p) => p,
            Err(e) => {
                warn!(datasource = %self.name, error = %e, "could not serialize payload for cache");
                return;
            }
        };

        let result = match store.put(key, &payload, self.ttl).await {
            Ok(()) if store.put_sets_expiry() => Ok(()),
            Ok(()) => store.set_expiry(key, self.ttl).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(datasource = %self.name, backend, error = %e, "cache write failed");
            metrics::counter!(telemetry::CACHE_ERRORS_TOTAL,
                "backend" => backend,
                "operation" => "put",
            )
            .increment(1);
        }
    }

    fn count_miss(&self, backend: &'static str) {
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL,
            "datasource" => self.name.clone(),
            "backend" => backend,
        )
        .increment(1);
    }
}
