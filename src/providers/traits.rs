//! Provider trait.
//!
//! Every datasource is backed by exactly one provider, chosen from its
//! schema's source type. A provider is driven in two steps per request:
//! [`DataProvider::process_request`] resolves the endpoint for the request
//! (route parameters, page override), then [`DataProvider::load`] returns
//! the data, from cache when possible.
//!
//! Providers never retry and never evict cache entries on failure; a failed
//! load is reported to the caller as-is.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::Result;
use crate::cache::CacheStatus;
use crate::types::RequestContext;

/// Data produced by a provider for one request.
#[derive(Debug, Clone, Serialize)]
pub struct Fetched {
    pub data: Value,
    /// How the cache was involved in producing `data`.
    pub cache: CacheStatus,
}

impl Fetched {
    /// Data that never went near the cache.
    pub fn uncached(data: Value) -> Self {
        Self {
            data,
            cache: CacheStatus::Bypassed,
        }
    }
}

/// Source of data for one datasource.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &'static str;

    /// Resolve this provider's endpoint for `request`.
    ///
    /// Must be called before [`load`](Self::load) for each request.
    fn process_request(&mut self, request: &RequestContext) -> Result<()>;

    /// Endpoint resolved by the last [`process_request`](Self::process_request),
    /// `None` for sources without one.
    fn endpoint(&self) -> Option<&str>;

    /// Produce the data for `request`.
    async fn load(&self, request: &RequestContext) -> Result<Fetched>;

    /// Drop per-request state.
    fn destroy(&mut self);
}
