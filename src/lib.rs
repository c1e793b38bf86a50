//! Mimir - datasource resolution and caching for page rendering
//!
//! A page declares one or more named datasources. For each render request
//! this crate resolves every datasource's endpoint from its schema, obtains
//! a bearer token when the datasource needs one, serves the response from a
//! TTL cache when possible and otherwise fetches it, then merges all results
//! into one data map for the view layer.
//!
//! # Example
//!
//! ```rust,no_run
//! use mimir::{Config, Pipeline, RequestContext};
//!
//! #[tokio::main]
//! async fn main() -> mimir::Result<()> {
//!     let config = Config::load("mimir.toml".as_ref())?;
//!     let pipeline = Pipeline::builder().config(config).build()?;
//!
//!     let request = RequestContext::parse("http://site.local/cars/ford")?
//!         .param("make", "ford");
//!     let page = pipeline.load_page(&["makes", "models"], &request).await?;
//!
//!     for error in &page.errors {
//!         eprintln!("{}: {}", error.name, error.message);
//!     }
//!     println!("{}", page.to_value());
//!     Ok(())
//! }
//! ```
//!
//! The library emits `tracing` events and `metrics` counters (see
//! [`telemetry`]); installing a subscriber or recorder is up to the host.

pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod datasource;
pub mod endpoint;
pub mod error;
pub mod pipeline;
pub mod providers;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use auth::{AuthStrategy, TokenManager, TokenRegistry, TokenState};
pub use cache::{CacheLayer, CacheStatus, CacheStore, DatasourceCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use datasource::{Datasource, SchemaLoader};
pub use error::{DatasourceError, MimirError, Result};
pub use pipeline::{PageData, Pipeline, PipelineBuilder};
pub use providers::{DataProvider, Fetched};

// Re-export all types
pub use types::{
    AuthConfig, CachingConfig, Credentials, DatasourceSchema, Fields, ParamTarget, QueryDefaults,
    RequestContext, RequestParam, SourceConfig, SourceType, Token,
};
