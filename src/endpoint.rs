//! Endpoint construction.
//!
//! Turns a datasource schema into a fully qualified request URL. The output
//! is a plain deterministic string: two requests with the same logical query
//! produce byte-identical URLs, since the URL is part of the cache key. No
//! URL-encoding is applied here; the HTTP client encodes on send.
//!
//! Query parameters are emitted in a fixed order (`count`, `page`, `search`,
//! `filter`, `fields`, `sort`) and only when set to a non-zero / non-empty
//! value.

use serde_json::{Map, Value};

use crate::types::{DatasourceSchema, Fields, ParamTarget, QueryDefaults, RequestContext};

/// Path and query for one request, after route parameters and pagination
/// overrides have been applied to the schema defaults.
#[derive(Debug, Clone)]
pub struct ResolvedQuery {
    pub path: String,
    pub query: QueryDefaults,
}

/// Apply request-time overrides to the schema's defaults.
///
/// - `requestParams` with `target: filter` copy a route parameter into
///   `filter[field]` (numeric strings become numbers).
/// - `requestParams` with `target: endpoint` replace `{field}` in the path.
/// - A `?page=N` on the incoming URL overrides `query.page` when the schema
///   paginates.
pub fn resolve(schema: &DatasourceSchema, request: &RequestContext) -> ResolvedQuery {
    let mut path = schema.source.path.clone();
    let mut query = schema.query.clone();

    for mapping in &schema.request_params {
        let Some(value) = request.route_param(&mapping.param) else {
            continue;
        };
        match mapping.target {
            ParamTarget::Filter => {
                query
                    .filter
                    .insert(mapping.field.clone(), coerce_param(value));
            }
            ParamTarget::Endpoint => {
                path = path.replace(&format!("{{{}}}", mapping.field), value);
            }
        }
    }

    if schema.paginate {
        if let Some(page) = request.page_override() {
            query.page = page;
        }
    }

    ResolvedQuery { path, query }
}

/// Build the endpoint for `schema` using its defaults only.
///
/// Returns `None` for static sources, which have no endpoint.
pub fn build(schema: &DatasourceSchema) -> Option<String> {
    if schema.is_static() {
        return None;
    }
    Some(build_url(
        &schema.source.protocol,
        &schema.source.host,
        schema.source.port,
        &schema.source.path,
        &schema.query,
    ))
}

/// Build the endpoint for `schema` as seen by `request`.
pub fn build_for_request(schema: &DatasourceSchema, request: &RequestContext) -> Option<String> {
    if schema.is_static() {
        return None;
    }
    let resolved = resolve(schema, request);
    Some(build_url(
        &schema.source.protocol,
        &schema.source.host,
        schema.source.port,
        &resolved.path,
        &resolved.query,
    ))
}

/// `protocol://host[:port]/path?query`
pub fn build_url(
    protocol: &str,
    host: &str,
    port: Option<u16>,
    path: &str,
    query: &QueryDefaults,
) -> String {
    let mut url = base_url(protocol, host, port, path);
    let qs = query_string(query);
    if !qs.is_empty() {
        url.push('?');
        url.push_str(&qs);
    }
    url
}

/// `protocol://host[:port]/path` with the port segment omitted when unset.
pub fn base_url(protocol: &str, host: &str, port: Option<u16>, path: &str) -> String {
    let path = path.trim_start_matches('/');
    match port {
        Some(port) => format!("{protocol}://{host}:{port}/{path}"),
        None => format!("{protocol}://{host}/{path}"),
    }
}

/// Query string in the fixed parameter order, without the leading `?`.
pub fn query_string(query: &QueryDefaults) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(6);

    if query.count > 0 {
        parts.push(format!("count={}", query.count));
    }
    if query.page > 0 {
        parts.push(format!("page={}", query.page));
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        parts.push(format!("search={search}"));
    }
    if !query.filter.is_empty() {
        parts.push(format!("filter={}", compact_json(&query.filter)));
    }
    if let Some(fields) = query.fields.as_ref().filter(|f| !f.is_empty()) {
        let rendered = match fields {
            Fields::List(list) => list.join(","),
            Fields::Map(map) => compact_json(map),
        };
        parts.push(format!("fields={rendered}"));
    }
    if !query.sort.is_empty() {
        parts.push(format!("sort={}", compact_json(&query.sort)));
    }

    parts.join("&")
}

fn compact_json(map: &Map<String, Value>) -> String {
    // Serializing a map of JSON values cannot fail.
    serde_json::to_string(map).unwrap_or_default()
}

fn coerce_param(value: &str) -> Value {
    match value.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::String(value.to_string()),
    }
}
