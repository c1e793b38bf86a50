//! Mimir error types

use serde::Serialize;

/// Mimir error types
#[derive(Debug, thiserror::Error)]
pub enum MimirError {
    // Configuration errors
    /// Schema file missing or invalid, bad global config. Fatal at load time.
    #[error("configuration error: {0}")]
    Configuration(String),

    // Auth errors
    /// The identity provider answered, but without a usable token
    /// (empty body, non-success status, unparseable JSON).
    #[error("authentication failed against {host}:{port}{path}: {reason}")]
    Authentication {
        host: String,
        port: String,
        path: String,
        reason: String,
    },

    /// The identity provider could not be reached (refused, timed out).
    #[error("could not reach token endpoint {host}:{port}{path}: {reason}")]
    AuthTransport {
        host: String,
        port: String,
        path: String,
        reason: String,
    },

    // Provider errors
    #[error("fetch failed for {url}: {message}")]
    Fetch {
        url: String,
        status: Option<u16>,
        message: String,
    },

    // Cache errors, never surfaced past DatasourceCache
    #[error("cache backend error: {0}")]
    Cache(String),

    // Data errors
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MimirError {
    /// Build a fetch error from a reqwest failure.
    pub(crate) fn fetch(url: &str, err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else {
            err.to_string()
        };
        MimirError::Fetch {
            url: url.to_string(),
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }

    /// Whether this error means the datasource is misconfigured rather than
    /// temporarily unavailable.
    pub fn is_configuration(&self) -> bool {
        matches!(self, MimirError::Configuration(_))
    }

    /// Convert into the error object handed to the view layer for
    /// datasource `name`.
    pub fn to_output(&self, name: &str) -> DatasourceError {
        let (remote_host, remote_port, remote_path) = match self {
            MimirError::Authentication {
                host, port, path, ..
            }
            | MimirError::AuthTransport {
                host, port, path, ..
            } => (Some(host.clone()), Some(port.clone()), Some(path.clone())),
            MimirError::Fetch { url, .. } => match url::Url::parse(url) {
                Ok(parsed) => (
                    parsed.host_str().map(str::to_string),
                    parsed.port_or_known_default().map(|p| p.to_string()),
                    Some(parsed.path().to_string()),
                ),
                Err(_) => (None, None, None),
            },
            _ => (None, None, None),
        };

        DatasourceError {
            name: name.to_string(),
            message: self.to_string(),
            remote_host,
            remote_port,
            remote_path,
        }
    }
}

/// Per-datasource error object delivered to the renderer in place of data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasourceError {
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_path: Option<String>,
}

/// Result type alias for Mimir operations
pub type Result<T> = std::result::Result<T, MimirError>;
