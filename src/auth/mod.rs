//! Bearer-token auth for datasources.
//!
//! - [`TokenManager`]: one token lifecycle per identity provider.
//! - [`TokenRegistry`]: hands out a shared manager per [`AuthConfig`]
//!   identity, so datasources pointing at the same identity provider reuse
//!   one token instead of each fetching their own.
//! - [`AuthStrategy`]: what a provider uses at request time: nothing, or a
//!   bearer header from a shared manager.

pub mod token;

pub use token::{TokenManager, TokenState};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::Result;
use crate::clock::Clock;
use crate::types::{AuthConfig, DatasourceSchema};

/// Shared [`TokenManager`]s keyed on [`AuthConfig::identity()`].
pub struct TokenRegistry {
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    managers: RwLock<HashMap<String, Arc<TokenManager>>>,
}

impl TokenRegistry {
    pub fn new(http: reqwest::Client, clock: Arc<dyn Clock>) -> Self {
        Self {
            http,
            clock,
            managers: RwLock::new(HashMap::new()),
        }
    }

    /// Get the manager for `config`, creating it on first use.
    pub fn manager(&self, config: &AuthConfig) -> Arc<TokenManager> {
        let identity = config.identity();

        // Fast path: already registered
        if let Some(manager) = self.managers.read().unwrap().get(&identity) {
            return manager.clone();
        }

        self.managers
            .write()
            .unwrap()
            .entry(identity)
            .or_insert_with(|| {
                Arc::new(TokenManager::new(
                    config.clone(),
                    self.http.clone(),
                    self.clock.clone(),
                ))
            })
            .clone()
    }

    /// Number of distinct identity providers seen so far.
    pub fn len(&self) -> usize {
        self.managers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How a provider authenticates its requests.
#[derive(Clone)]
pub enum AuthStrategy {
    /// Schema has no `auth` block.
    None,
    /// `Authorization: Bearer <token>` from a shared manager.
    Bearer(Arc<TokenManager>),
}

impl AuthStrategy {
    /// No-op strategy when the schema has no auth block, otherwise a bearer
    /// strategy bound to the registry's shared manager.
    pub fn for_schema(schema: &DatasourceSchema, registry: &TokenRegistry) -> Self {
        match &schema.auth {
            None => AuthStrategy::None,
            Some(config) => AuthStrategy::Bearer(registry.manager(config)),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, AuthStrategy::None)
    }

    /// The `Authorization` header value, if any.
    pub async fn authorization(&self) -> Result<Option<String>> {
        match self {
            AuthStrategy::None => Ok(None),
            AuthStrategy::Bearer(manager) => {
                let token = manager.get_token(false).await?;
                Ok(Some(format!("Bearer {token}")))
            }
        }
    }

    /// Attach the `Authorization` header to an outgoing request.
    pub async fn apply(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        Ok(match self.authorization().await? {
            Some(value) => request.header(reqwest::header::AUTHORIZATION, value),
            None => request,
        })
    }
}

impl std::fmt::Debug for AuthStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthStrategy::None => f.write_str("AuthStrategy::None"),
            AuthStrategy::Bearer(manager) => f
                .debug_tuple("AuthStrategy::Bearer")
                .field(&manager.config().host)
                .finish(),
        }
    }
}
