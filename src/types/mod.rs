//! Public types for the Mimir API.

mod request;
mod schema;
mod token;

pub use request::{CACHE_BYPASS_PARAM, RequestContext};
pub use schema::{
    AuthConfig, CachingConfig, Credentials, DatasourceSchema, Fields, ParamTarget, QueryDefaults,
    RequestParam, SourceConfig, SourceType,
};
pub use token::Token;
