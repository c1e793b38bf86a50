//! WordPress REST API provider.
//!
//! Translates the schema query into WordPress's own parameter names:
//!
//! | schema    | WordPress             |
//! |-----------|-----------------------|
//! | `count`   | `per_page`            |
//! | `page`    | `page`                |
//! | `search`  | `search`              |
//! | `filter`  | one parameter per key |
//! | `fields`  | `_fields`             |
//! | `sort`    | `orderby` + `order`   |

use async_trait::async_trait;
use serde_json::Value;

use super::traits::{DataProvider, Fetched};
use super::{ProviderContext, fetch_body, load_through_cache, parse_json};
use crate::endpoint;
use crate::types::{QueryDefaults, RequestContext};
use crate::{MimirError, Result};

/// Route prefix of the WordPress REST API.
const API_PREFIX: &str = "wp-json/wp/v2";

/// Provider for `wordpress` sources.
pub struct WordPressProvider {
    context: ProviderContext,
    url: Option<String>,
}

impl WordPressProvider {
    pub fn new(context: ProviderContext) -> Self {
        Self { context, url: None }
    }
}

/// `/wp-json/wp/v2/<path>?...` for the given query.
pub fn build_url(
    protocol: &str,
    host: &str,
    port: Option<u16>,
    path: &str,
    query: &QueryDefaults,
) -> String {
    let route = format!("{API_PREFIX}/{}", path.trim_start_matches('/'));
    let mut url = endpoint::base_url(protocol, host, port, &route);
    let qs = query_string(query);
    if !qs.is_empty() {
        url.push('?');
        url.push_str(&qs);
    }
    url
}

fn query_string(query: &QueryDefaults) -> String {
    let mut parts = Vec::new();

    if query.count > 0 {
        parts.push(format!("per_page={}", query.count));
    }
    if query.page > 0 {
        parts.push(format!("page={}", query.page));
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        parts.push(format!("search={search}"));
    }
    for (key, value) in &query.filter {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        parts.push(format!("{key}={rendered}"));
    }
    if let Some(fields) = query.fields.as_ref().filter(|f| !f.is_empty()) {
        parts.push(format!("_fields={}", fields.names().join(",")));
    }
    if let Some((field, direction)) = query.sort.iter().next() {
        let order = if direction.as_i64() == Some(-1) {
            "desc"
        } else {
            "asc"
        };
        parts.push(format!("orderby={field}&order={order}"));
    }

    parts.join("&")
}

#[async_trait]
impl DataProvider for WordPressProvider {
    fn name(&self) -> &'static str {
        "wordpress"
    }

    fn process_request(&mut self, request: &RequestContext) -> Result<()> {
        let schema = &self.context.schema;
        let resolved = endpoint::resolve(schema, request);
        self.url = Some(build_url(
            &schema.source.protocol,
            &schema.source.host,
            schema.source.port,
            &resolved.path,
            &resolved.query,
        ));
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

        load_through_cache(&self.context, url, request, || async {
            let body = fetch_body(&self.context, self.name(), url).await?;
            parse_json(url, &body)
        })
        .await
    }

    fn destroy(&mut self) {
        self.url = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Fields;
    use serde_json::json;

    #[test]
    fn maps_query_to_wordpress_parameters() {
        let mut query = QueryDefaults {
            count: 5,
            page: 2,
            search: Some("electric".into()),
            fields: Some(Fields::List(vec!["id".into(), "title".into()])),
            ..QueryDefaults::default()
        };
        query.filter.insert("categories".into(), json!(7));
        query.sort.insert("date".into(), json!(-1));

        assert_eq!(
            build_url("https", "blog.local", None, "/posts", &query),
            "https://blog.local/wp-json/wp/v2/posts?per_page=5&page=2&search=electric\
             &categories=7&_fields=id,title&orderby=date&order=desc"
        );
    }

    #[test]
    fn bare_route_without_query() {
        assert_eq!(
            build_url("http", "blog.local", Some(8080), "pages", &QueryDefaults::default()),
            "http://blog.local:8080/wp-json/wp/v2/pages"
        );
    }

    #[test]
    fn string_filters_are_unquoted() {
        let mut query = QueryDefaults::default();
        query.filter.insert("slug".into(), json!("hello-world"));
        assert_eq!(
            build_url("http", "b", None, "posts", &query),
            "http://b/wp-json/wp/v2/posts?slug=hello-world"
        );
    }
}
