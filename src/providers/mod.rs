//! Provider implementations.
//!
//! The set is closed: [`initialise`] picks one implementation per
//! [`SourceType`]. Providers that talk to the network share
//! [`ProviderContext`], which carries the HTTP client, the auth strategy and
//! the datasource's cache view.

pub mod feed;
pub mod remote;
pub mod static_data;
pub mod traits;
pub mod wordpress;

pub use feed::FeedProvider;
pub use remote::RemoteProvider;
pub use static_data::StaticProvider;
pub use traits::{DataProvider, Fetched};
pub use wordpress::WordPressProvider;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::AuthStrategy;
use crate::cache::DatasourceCache;
use crate::types::{DatasourceSchema, RequestContext, SourceType};
use crate::{MimirError, Result, telemetry};

/// Everything a provider needs besides its own schema-derived state.
#[derive(Clone)]
pub struct ProviderContext {
    pub schema: Arc<DatasourceSchema>,
    pub http: reqwest::Client,
    pub auth: AuthStrategy,
    pub cache: DatasourceCache,
}

/// Create the provider for the context's source type.
pub fn initialise(context: ProviderContext) -> Result<Box<dyn DataProvider>> {
    let provider: Box<dyn DataProvider> = match context.schema.source_type() {
        SourceType::Remote => Box::new(RemoteProvider::new(context)),
        SourceType::Static => Box::new(StaticProvider::new(context.schema)?),
        SourceType::Rss => Box::new(FeedProvider::new(context)),
        SourceType::Wordpress => Box::new(WordPressProvider::new(context)),
    };
    Ok(provider)
}

/// Serve `endpoint` from cache, or run `fetch` and cache what it returns.
///
/// The cache is consulted before anything else, so a hit costs no token
/// lookup and no network call. A failed fetch leaves the cache untouched.
pub(crate) async fn load_through_cache<F, Fut>(
    context: &ProviderContext,
    endpoint: &str,
    request: &RequestContext,
    fetch: F,
) -> Result<Fetched>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    let key = context.cache.key(endpoint);
    let lookup = context.cache.get_from_cache(&key, request).await;
    if let Some(data) = lookup.value {
        return Ok(Fetched {
            data,
            cache: lookup.status,
        });
    }

    let data = fetch().await?;
    context.cache.cache_response(&key, &data, request).await;
    Ok(Fetched {
        data,
        cache: lookup.status,
    })
}

/// GET `url` with the context's auth applied and return the response body.
///
/// Non-success statuses and transport failures become [`MimirError::Fetch`];
/// auth failures propagate unchanged.
pub(crate) async fn fetch_body(
    context: &ProviderContext,
    provider: &'static str,
    url: &str,
) -> Result<String> {
    let request = context.auth.apply(context.http.get(url)).await?;

    debug!(datasource = %context.schema.name, provider, url, "fetching");
    let start = Instant::now();
    let result = send(request, url).await;
    metrics::histogram!(telemetry::FETCH_DURATION_SECONDS, "provider" => provider)
        .record(start.elapsed().as_secs_f64());

    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(telemetry::FETCHES_TOTAL,
        "provider" => provider,
        "status" => status,
    )
    .increment(1);

    if let Err(e) = &result {
        warn!(datasource = %context.schema.name, provider, error = %e, "fetch failed");
    }
    result
}

async fn send(request: reqwest::RequestBuilder, url: &str) -> Result<String> {
    let response = request
        .send()
        .await
        .map_err(|e| MimirError::fetch(url, &e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {}", truncate(&body, 200))
        };
        return Err(MimirError::Fetch {
            url: url.to_string(),
            status: Some(status.as_u16()),
            message,
        });
    }

    response.text().await.map_err(|e| MimirError::fetch(url, &e))
}

/// Parse a response body as JSON, reporting failures against `url`.
pub(crate) fn parse_json(url: &str, body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|e| MimirError::Fetch {
        url: url.to_string(),
        status: None,
        message: format!("invalid JSON in response: {e}"),
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
