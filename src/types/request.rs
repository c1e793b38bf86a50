//! The slice of an inbound render request the pipeline needs.

use std::collections::HashMap;

use url::Url;

use crate::{MimirError, Result};

/// Query parameter that disables caching for a request when set to `false`.
pub const CACHE_BYPASS_PARAM: &str = "cache";

/// Request-scoped inputs: the incoming URL and the route parameters the
/// router extracted from it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    url: Url,
    params: HashMap<String, String>,
    debug: bool,
}

impl RequestContext {
    /// Wrap an already-parsed URL.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            params: HashMap::new(),
            debug: false,
        }
    }

    /// Parse the incoming request URL.
    pub fn parse(url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| MimirError::InvalidRequest(format!("bad request url '{url}': {e}")))?;
        Ok(Self::new(url))
    }

    /// Add a route parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Mark the request as a debug view; debug requests never use the cache.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Route parameter by name.
    pub fn route_param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// First value of a query-string parameter on the incoming URL.
    pub fn query_value(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// `?cache=false` or a debug view.
    pub fn bypasses_cache(&self) -> bool {
        self.debug
            || self
                .query_value(CACHE_BYPASS_PARAM)
                .is_some_and(|v| v.eq_ignore_ascii_case("false"))
    }

    /// Page number requested via `?page=N`, if it parses as a positive integer.
    pub fn page_override(&self) -> Option<u32> {
        self.query_value("page")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|p| *p > 0)
    }
}
