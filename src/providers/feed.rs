//! RSS feed provider.
//!
//! The feed URL is the schema's source location without query parameters;
//! the parsed channel is cached whole and truncated to `query.count` on the
//! way out, so datasources with different counts share one fetch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::traits::{DataProvider, Fetched};
use super::{ProviderContext, fetch_body, load_through_cache};
use crate::endpoint;
use crate::types::RequestContext;
use crate::{MimirError, Result};

/// One feed entry as handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub guid: Option<String>,
    /// RFC 3339, UTC. `None` when absent or not valid RFC 2822.
    pub pub_date: Option<String>,
    pub categories: Vec<String>,
}

/// Parsed channel.
#[derive(Debug, Clone, Serialize)]
pub struct Feed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<FeedItem>,
}

/// Parse an RSS document.
pub fn parse_feed(url: &str, body: &str) -> Result<Feed> {
    let channel = rss::Channel::read_from(body.as_bytes()).map_err(|e| MimirError::Fetch {
        url: url.to_string(),
        status: None,
        message: format!("invalid RSS document: {e}"),
    })?;

    let items = channel
        .items()
        .iter()
        .map(|item| FeedItem {
            title: item.title().map(String::from),
            link: item.link().map(String::from),
            description: item.description().map(String::from),
            author: item.author().map(String::from),
            guid: item.guid().map(|g| g.value().to_string()),
            pub_date: item
                .pub_date()
                .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                .map(|dt| dt.with_timezone(&Utc).to_rfc3339()),
            categories: item
                .categories()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
        })
        .collect();

    Ok(Feed {
        title: channel.title().to_string(),
        link: channel.link().to_string(),
        description: channel.description().to_string(),
        items,
    })
}

/// Keep the first `count` items of a serialized [`Feed`]; zero keeps all.
fn truncate_items(mut feed: Value, count: u32) -> Value {
    if count > 0 {
        if let Some(items) = feed.get_mut("items").and_then(Value::as_array_mut) {
            items.truncate(count as usize);
        }
    }
    feed
}

/// Provider for `rss` sources.
pub struct FeedProvider {
    context: ProviderContext,
    url: Option<String>,
    count: u32,
}

impl FeedProvider {
    pub fn new(context: ProviderContext) -> Self {
        let count = context.schema.query.count;
        Self {
            context,
            url: None,
            count,
        }
    }
}

#[async_trait]
impl DataProvider for FeedProvider {
    fn name(&self) -> &'static str {
        "rss"
    }

    fn process_request(&mut self, request: &RequestContext) -> Result<()> {
        let schema = &self.context.schema;
        let resolved = endpoint::resolve(schema, request);
        self.url = Some(endpoint::base_url(
            &schema.source.protocol,
            &schema.source.host,
            schema.source.port,
            &resolved.path,
        ));
        self.count = resolved.query.count;
        Ok(())
    }

    fn endpoint(&self) -> Option<&str> {
        self.url.as_deref()
    }

    async fn load(&self, request: &RequestContext) -> Result<Fetched> {
        let url = self.url.as_deref().ok_or_else(|| {
            MimirError::InvalidRequest(format!(
                "datasource '{}' loaded before its endpoint was resolved",
                self.context.schema.name
            ))
        })?;

        let fetched = load_through_cache(&self.context, url, request, || async {
            let body = fetch_body(&self.context, self.name(), url).await?;
            let feed = parse_feed(url, &body)?;
            serde_json::to_value(feed).map_err(MimirError::from)
        })
        .await?;

        Ok(Fetched {
            data: truncate_items(fetched.data, self.count),
            cache: fetched.cache,
        })
    }

    fn destroy(&mut self) {
        self.url = None;
    }
}
