//! Generic JSON API provider.

use async_trait::async_trait;

use super::traits::{DataProvider, Fetched};
use super::{ProviderContext, fetch_body, load_through_cache, parse_json};
use crate::endpoint;
use crate::types::RequestContext;
use crate::{MimirError, Result};

/// Fetches JSON from the schema's endpoint, optionally with a bearer token.
pub struct RemoteProvider {
    context: ProviderContext,
    endpoint: Option<String>,
}

impl RemoteProvider {
    pub fn new(context: ProviderContext) -> Self {
        Self {
            context,
            endpoint: None,
        }
    }
}

#[async_trait]
impl DataProvider for RemoteProvider {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn process_request(&mut self, request: &RequestContext) -> Result<()> {
        self.endpoint = endpoint::build_for_request(&self.context.schema, request);
        Ok(())
    }

    fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    async fn load(&self, request: &RequestContext) -> Result<Fetched> {
        let url = self.endpoint.as_deref().ok_or_else(|| {
            MimirError::InvalidRequest(format!(
                "datasource '{}' loaded before its endpoint was resolved",
                self.context.schema.name
            ))
        })?;

        load_through_cache(&self.context, url, request, || async {
            let body = fetch_body(&self.context, self.name(), url).await?;
            parse_json(url, &body)
        })
        .await
    }

    fn destroy(&mut self) {
        self.endpoint = None;
    }
}
