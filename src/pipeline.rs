//! The datasource pipeline.
//!
//! [`Pipeline`] owns the process-wide services every datasource shares: the
//! configuration, the HTTP client, the cache store, the token registry, the
//! clock and the schema loader. [`Pipeline::load_page`] resolves all
//! datasources of a page concurrently and merges their output into one map
//! for the renderer.
//!
//! # Example
//!
//! ```rust,no_run
//! use mimir::{Config, Pipeline, RequestContext};
//!
//! # async fn run() -> mimir::Result<()> {
//! let pipeline = Pipeline::builder()
//!     .config(Config::from_toml("[caching]\nttl = 60")?)
//!     .schema_dir("./workspace/datasources")
//!     .build()?;
//!
//! let request = RequestContext::parse("http://site.local/cars?page=2")?;
//! let page = pipeline.load_page(&["makes", "models"], &request).await?;
//! println!("{}", page.to_value());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, instrument, warn};

use crate::Result;
use crate::auth::TokenRegistry;
use crate::cache::{self, CacheLayer, CacheStatus, CacheStore};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::datasource::{Datasource, SchemaLoader};
use crate::error::DatasourceError;
use crate::providers::Fetched;
use crate::types::{DatasourceSchema, RequestContext};

// ============================================================================
// Page output
// ============================================================================

/// Merged output of every datasource on a page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageData {
    /// `name -> data`, or `name -> error object` for failed datasources.
    pub data: Map<String, Value>,
    /// Failed datasources, in name order.
    pub errors: Vec<DatasourceError>,
    /// Cache diagnostics for datasources that loaded.
    pub cache: BTreeMap<String, CacheStatus>,
}

impl PageData {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error(&self, name: &str) -> Option<&DatasourceError> {
        self.errors.iter().find(|e| e.name == name)
    }

    /// The merged data map handed to the renderer.
    pub fn to_value(&self) -> Value {
        Value::Object(self.data.clone())
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Shared services for resolving datasources.
pub struct Pipeline {
    config: Config,
    http: reqwest::Client,
    cache: CacheLayer,
    tokens: TokenRegistry,
    clock: Arc<dyn Clock>,
    schemas: SchemaLoader,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn cache_layer(&self) -> &CacheLayer {
        &self.cache
    }

    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn schemas(&self) -> &SchemaLoader {
        &self.schemas
    }

    /// Set up the datasource `name`.
    pub async fn datasource(&self, name: &str) -> Result<Datasource> {
        Datasource::new(name, self).await
    }

    /// Resolve one datasource for `request`.
    pub async fn load(&self, name: &str, request: &RequestContext) -> Result<Fetched> {
        let mut datasource = self.datasource(name).await?;
        let result = datasource.load(request).await;
        datasource.destroy();
        result
    }

    /// Set up every datasource in `names` without fetching anything.
    ///
    /// A missing or invalid schema fails the whole set with
    /// [`MimirError::Configuration`](crate::MimirError::Configuration).
    pub async fn prepare<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Datasource>> {
        let setups = names.iter().map(|name| self.datasource(name.as_ref()));
        join_all(setups).await.into_iter().collect()
    }

    /// Resolve every datasource in `names` concurrently.
    ///
    /// Configuration errors are fatal and returned before any datasource is
    /// fetched. Runtime failures are isolated: a datasource that fails to
    /// authenticate or fetch contributes an error object under its name and
    /// does not affect the others.
    #[instrument(skip_all, fields(url = %request.url(), datasources = names.len()))]
    pub async fn load_page<S: AsRef<str>>(
        &self,
        names: &[S],
        request: &RequestContext,
    ) -> Result<PageData> {
        let mut datasources = self.prepare(names).await.inspect_err(|e| {
            error!(error = %e, "page has an invalid datasource");
        })?;

        let loads = datasources.iter_mut().map(|datasource| async move {
            let result = datasource.load(request).await;
            datasource.destroy();
            (datasource.name().to_string(), result)
        });

        let mut page = PageData::default();
        for (name, result) in join_all(loads).await {
            match result {
                Ok(fetched) => {
                    page.cache.insert(name.clone(), fetched.cache);
                    page.data.insert(name, fetched.data);
                }
                Err(e) => {
                    warn!(datasource = %name, error = %e, "datasource failed");
                    let output = e.to_output(&name);
                    // DatasourceError has only string fields.
                    let value = serde_json::to_value(&output).unwrap_or(Value::Null);
                    page.data.insert(name, value);
                    page.errors.push(output);
                }
            }
        }
        page.errors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("caching", &self.cache.enabled)
            .field("store", &self.cache.store.as_ref().map(|s| s.backend()))
            .field("schema_paths", &self.schemas.paths())
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    config: Config,
    clock: Option<Arc<dyn Clock>>,
    http: Option<reqwest::Client>,
    store: Option<Arc<dyn CacheStore>>,
    schema_dirs: Vec<PathBuf>,
    schemas: Vec<DatasourceSchema>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            clock: None,
            http: None,
            store: None,
            schema_dirs: Vec::new(),
            schemas: Vec::new(),
        }
    }

    /// Use `config` instead of the defaults.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Time source for token and cache expiry (default: system clock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use a preconfigured HTTP client instead of one built from the config.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Use `store` instead of the backend selected by the config.
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Search `dir` for schemas, ahead of the configured paths.
    pub fn schema_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.schema_dirs.push(dir.into());
        self
    }

    /// Register a schema without a file.
    pub fn schema(mut self, schema: DatasourceSchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Build the pipeline, opening the configured cache backend.
    pub fn build(self) -> Result<Pipeline> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let http = match self.http {
            Some(client) => client,
            None => self.config.http_client()?,
        };
        let store = match self.store {
            Some(store) => Some(store),
            None => cache::open_store(&self.config.caching, clock.clone())?,
        };
        let cache = CacheLayer {
            enabled: self.config.caching_enabled(),
            default_ttl: self.config.caching.default_ttl(),
            store,
            clock: clock.clone(),
        };

        let mut paths = self.schema_dirs;
        paths.extend(self.config.datasources.paths.iter().cloned());
        let schemas = SchemaLoader::new(paths);
        for schema in self.schemas {
            schemas.insert(schema);
        }

        Ok(Pipeline {
            tokens: TokenRegistry::new(http.clone(), clock.clone()),
            config: self.config,
            http,
            cache,
            clock,
            schemas,
        })
    }
}
