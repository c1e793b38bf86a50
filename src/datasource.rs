//! Datasources and their schema loader.
//!
//! A [`Datasource`] binds one schema to its provider and auth strategy.
//! Schemas come from a [`SchemaLoader`], which searches the configured
//! directories for `<name>.json` and keeps every schema it has parsed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::{debug, instrument};

use crate::auth::AuthStrategy;
use crate::cache::DatasourceCache;
use crate::pipeline::Pipeline;
use crate::providers::{self, DataProvider, Fetched, ProviderContext};
use crate::types::{DatasourceSchema, RequestContext};
use crate::{MimirError, Result};

// ============================================================================
// Schema loading
// ============================================================================

/// Finds and parses datasource schemas. Parsed schemas are kept for the
/// lifetime of the loader.
pub struct SchemaLoader {
    paths: Vec<PathBuf>,
    loaded: RwLock<HashMap<String, Arc<DatasourceSchema>>>,
}

impl SchemaLoader {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    /// Directories searched, in order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Register a schema directly, replacing any loaded under the same name.
    pub fn insert(&self, schema: DatasourceSchema) {
        self.loaded
            .write()
            .unwrap()
            .insert(schema.name.clone(), Arc::new(schema));
    }

    /// Schema for `name`, read from disk on first use.
    pub async fn load(&self, name: &str) -> Result<Arc<DatasourceSchema>> {
        if let Some(schema) = self.loaded.read().unwrap().get(name) {
            return Ok(schema.clone());
        }

        validate_name(name)?;
        let file = format!("{name}.json");
        for dir in &self.paths {
            let path = dir.join(&file);
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(MimirError::Configuration(format!(
                        "failed to read schema {path:?}: {e}"
                    )));
                }
            };
            debug!(datasource = name, path = %path.display(), "loaded schema");
            let schema = Arc::new(DatasourceSchema::from_json(name, &content)?);
            self.loaded
                .write()
                .unwrap()
                .insert(name.to_string(), schema.clone());
            return Ok(schema);
        }

        Err(MimirError::Configuration(format!(
            "datasource '{name}' not found in {:?}",
            self.paths
        )))
    }
}

/// Names are file stems: no separators, no parent references.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return Err(MimirError::Configuration(format!(
            "invalid datasource name '{name}'"
        )));
    }
    Ok(())
}

// ============================================================================
// Datasource
// ============================================================================

/// One named datasource, ready to load.
pub struct Datasource {
    schema: Arc<DatasourceSchema>,
    auth: AuthStrategy,
    provider: Box<dyn DataProvider>,
}

impl Datasource {
    /// Load the schema for `name` and set up its provider.
    ///
    /// A missing or invalid schema is a [`MimirError::Configuration`] error.
    pub async fn new(name: &str, pipeline: &Pipeline) -> Result<Self> {
        let schema = pipeline.schemas().load(name).await?;
        Self::from_schema(schema, pipeline)
    }

    /// Set up a datasource for an already-loaded schema.
    pub fn from_schema(schema: Arc<DatasourceSchema>, pipeline: &Pipeline) -> Result<Self> {
        let auth = AuthStrategy::for_schema(&schema, pipeline.tokens());
        let cache = DatasourceCache::new(&schema, pipeline.cache_layer().clone());
        let provider = providers::initialise(ProviderContext {
            schema: schema.clone(),
            http: pipeline.http().clone(),
            auth: auth.clone(),
            cache,
        })?;
        Ok(Self {
            schema,
            auth,
            provider,
        })
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &DatasourceSchema {
        &self.schema
    }

    pub fn auth(&self) -> &AuthStrategy {
        &self.auth
    }

    /// Provider name, e.g. `"remote"`.
    pub fn provider(&self) -> &'static str {
        self.provider.name()
    }

    /// Endpoint resolved by the last [`load`](Self::load).
    pub fn endpoint(&self) -> Option<&str> {
        self.provider.endpoint()
    }

    /// Resolve the endpoint for `request` and load the data.
    #[instrument(skip_all, fields(datasource = %self.schema.name))]
    pub async fn load(&mut self, request: &RequestContext) -> Result<Fetched> {
        self.provider.process_request(request)?;
        self.provider.load(request).await
    }

    /// Release per-request provider state.
    pub fn destroy(&mut self) {
        self.provider.destroy();
    }
}

impl std::fmt::Debug for Datasource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datasource")
            .field("name", &self.schema.name)
            .field("provider", &self.provider.name())
            .field("auth", &self.auth)
            .finish()
    }
}
