//! Datasource schema documents.
//!
//! A schema is a JSON document describing one named datasource:
//!
//! ```json
//! {
//!   "source": { "type": "remote", "protocol": "http", "host": "api.local", "port": 3000, "path": "makes" },
//!   "auth": { "host": "api.local", "port": 3000, "tokenPath": "/token",
//!             "credentials": { "clientId": "web", "secret": "s3cret" } },
//!   "caching": { "enabled": true, "ttl": 300 },
//!   "query": { "count": 20, "page": 1, "fields": ["name"] },
//!   "requestParams": [ { "param": "make", "field": "name" } ]
//! }
//! ```
//!
//! The source may also be given inline, with `type`, `host`, `port` and
//! `path` at the top level, and the blocks may use their long names
//! (`authConfig`, `cachingConfig`, `queryDefaults`):
//!
//! ```json
//! { "type": "remote", "host": "api.local", "port": 3000, "path": "makes",
//!   "queryDefaults": { "count": 20, "page": 1 } }
//! ```
//!
//! Schemas are immutable once loaded.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sha1::{Digest, Sha1};

use crate::{MimirError, Result};

/// Where a datasource gets its data from. Selects the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Generic JSON HTTP API.
    #[serde(alias = "dadiapi", alias = "api")]
    Remote,
    /// Literal data embedded in the schema.
    Static,
    /// RSS syndication feed.
    Rss,
    /// WordPress REST API.
    Wordpress,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Remote => "remote",
            SourceType::Static => "static",
            SourceType::Rss => "rss",
            SourceType::Wordpress => "wordpress",
        }
    }
}

/// Remote location (or embedded data) for a datasource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "type", alias = "sourceType")]
    pub source_type: SourceType,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub host: String,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    #[serde(default, alias = "endpoint")]
    pub path: String,
    /// Records for `static` sources.
    #[serde(default)]
    pub data: Option<Vec<Value>>,
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_token_path() -> String {
    "/token".to_string()
}

fn default_true() -> bool {
    true
}

/// Accepts `3000`, `"3000"` or `""` (no port).
fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Number(u16),
        Text(String),
    }

    match Option::<RawPort>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawPort::Number(n)) => Ok(Some(n)),
        Some(RawPort::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(RawPort::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port '{s}'"))),
    }
}

/// Identity-provider settings for bearer-token auth.
///
/// Several datasources may carry identical auth blocks; they share a single
/// token lifecycle keyed on [`AuthConfig::identity()`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub host: String,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    #[serde(default = "default_token_path")]
    pub token_path: String,
    pub credentials: Credentials,
}

impl AuthConfig {
    /// Stable identity used to share one token between datasources.
    ///
    /// Hash of protocol, host, port, token path and client id. The secret is
    /// not part of the identity.
    pub fn identity(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(self.protocol.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.host.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.port_label().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.token_path.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.credentials.client_id.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Full URL of the token endpoint.
    pub fn token_url(&self) -> String {
        let path = self.token_path.trim_start_matches('/');
        match self.port {
            Some(port) => format!("{}://{}:{}/{}", self.protocol, self.host, port, path),
            None => format!("{}://{}/{}", self.protocol, self.host, path),
        }
    }

    /// Port as shown in diagnostics (empty when unset).
    pub fn port_label(&self) -> String {
        self.port.map(|p| p.to_string()).unwrap_or_default()
    }
}

/// Client credentials posted to the token endpoint.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub client_id: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Per-datasource caching policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// TTL in seconds; falls back to the global default when absent.
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: None,
        }
    }
}

/// Field selection, either `["a", "b"]` or `{"a": 1, "b": 1}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fields {
    List(Vec<String>),
    Map(Map<String, Value>),
}

impl Fields {
    pub fn is_empty(&self) -> bool {
        match self {
            Fields::List(list) => list.is_empty(),
            Fields::Map(map) => map.is_empty(),
        }
    }

    /// Names of the selected fields, in declaration (list) or key (map) order.
    /// Map entries with a falsy value (`0`, `false`) are excluded.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Fields::List(list) => list.iter().map(String::as_str).collect(),
            Fields::Map(map) => map
                .iter()
                .filter(|(_, v)| !matches!(v, Value::Bool(false)) && v.as_i64() != Some(0))
                .map(|(k, _)| k.as_str())
                .collect(),
        }
    }
}

/// Default query parameters for a datasource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryDefaults {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub filter: Map<String, Value>,
    #[serde(default)]
    pub fields: Option<Fields>,
    /// `{"field": 1}` ascending, `{"field": -1}` descending.
    #[serde(default)]
    pub sort: Map<String, Value>,
}

/// Where a route parameter is injected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamTarget {
    /// `filter[field] = value`
    #[default]
    Filter,
    /// Replace `{field}` in the source path.
    Endpoint,
}

/// Mapping from a route parameter to the datasource query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestParam {
    pub param: String,
    pub field: String,
    #[serde(default)]
    pub target: ParamTarget,
}

/// Immutable descriptor of one named datasource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "SchemaDocument")]
pub struct DatasourceSchema {
    #[serde(default)]
    pub name: String,
    pub source: SourceConfig,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub caching: CachingConfig,
    #[serde(default)]
    pub query: QueryDefaults,
    #[serde(default)]
    pub request_params: Vec<RequestParam>,
    /// Honour a `page` query parameter on the incoming request.
    #[serde(default = "default_true")]
    pub paginate: bool,
}

/// A schema document as written, before the source location is settled.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaDocument {
    #[serde(default)]
    name: String,
    #[serde(default)]
    source: Option<SourceConfig>,
    /// `type`, `host`, `port` and `path` at the top level.
    #[serde(flatten)]
    inline_source: Option<SourceConfig>,
    #[serde(default, alias = "authConfig")]
    auth: Option<AuthConfig>,
    #[serde(default, alias = "cachingConfig")]
    caching: CachingConfig,
    #[serde(default, alias = "queryDefaults")]
    query: QueryDefaults,
    #[serde(default)]
    request_params: Vec<RequestParam>,
    #[serde(default = "default_true")]
    paginate: bool,
}

impl TryFrom<SchemaDocument> for DatasourceSchema {
    type Error = String;

    fn try_from(doc: SchemaDocument) -> std::result::Result<Self, Self::Error> {
        let source = doc
            .source
            .or(doc.inline_source)
            .ok_or_else(|| "missing source: expected `source` or a top-level `type`".to_string())?;
        Ok(Self {
            name: doc.name,
            source,
            auth: doc.auth,
            caching: doc.caching,
            query: doc.query,
            request_params: doc.request_params,
            paginate: doc.paginate,
        })
    }
}

impl DatasourceSchema {
    /// Parse a schema document. `name` is used when the document has none.
    pub fn from_json(name: &str, json: &str) -> Result<Self> {
        let mut schema: DatasourceSchema = serde_json::from_str(json).map_err(|e| {
            MimirError::Configuration(format!("invalid schema for datasource '{name}': {e}"))
        })?;
        if schema.name.is_empty() {
            schema.name = name.to_string();
        }
        schema.validate()?;
        Ok(schema)
    }

    fn validate(&self) -> Result<()> {
        match self.source.source_type {
            SourceType::Static => {
                if self.source.data.is_none() {
                    return Err(MimirError::Configuration(format!(
                        "static datasource '{}' has no data",
                        self.name
                    )));
                }
            }
            _ => {
                if self.source.host.is_empty() {
                    return Err(MimirError::Configuration(format!(
                        "datasource '{}' has no source host",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn source_type(&self) -> SourceType {
        self.source.source_type
    }

    pub fn is_static(&self) -> bool {
        self.source.source_type == SourceType::Static
    }
}
