//! Global configuration.
//!
//! Loaded from a TOML file; every section and field has a default, so an
//! empty file (or [`Config::default()`]) is a working configuration that
//! caches to the user cache directory.
//!
//! ```toml
//! debug = false
//!
//! [caching]
//! enabled = true
//! ttl = 300
//!
//! [caching.directory]
//! enabled = true
//! path = "./cache/web"
//! extension = "json"
//!
//! [caching.redis]
//! enabled = false
//! host = "127.0.0.1"
//! port = 6379
//!
//! [datasources]
//! paths = ["./workspace/datasources"]
//!
//! [http]
//! timeout_secs = 10
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::memory::DEFAULT_MAX_ENTRIES;
use crate::{MimirError, Result};

/// Process-wide configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Debug mode serves every datasource live, bypassing the cache.
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub caching: CachingSettings,
    #[serde(default)]
    pub datasources: DatasourceSettings,
    #[serde(default)]
    pub http: HttpSettings,
}

/// Which cache backend is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    File,
    Redis,
    Memory,
    None,
}

/// Cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CachingSettings {
    /// Global caching switch (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Default TTL in seconds (default: 300).
    #[serde(default = "default_ttl")]
    pub ttl: u64,
    #[serde(default)]
    pub directory: DirectorySettings,
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub memory: MemorySettings,
}

impl Default for CachingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: default_ttl(),
            directory: DirectorySettings::default(),
            redis: RedisSettings::default(),
            memory: MemorySettings::default(),
        }
    }
}

impl CachingSettings {
    /// Backend selection: redis, then memory, then directory.
    pub fn backend(&self) -> CacheBackend {
        if self.redis.enabled {
            CacheBackend::Redis
        } else if self.memory.enabled {
            CacheBackend::Memory
        } else if self.directory.enabled {
            CacheBackend::File
        } else {
            CacheBackend::None
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }
}

/// Filesystem cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectorySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cache root, created at startup if absent.
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_cache_path(),
            extension: default_extension(),
        }
    }
}

/// Redis cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: u32,
    /// Upper bound on any single redis operation, in milliseconds.
    #[serde(default = "default_redis_timeout")]
    pub timeout_ms: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_redis_host(),
            port: default_redis_port(),
            password: None,
            database: 0,
            timeout_ms: default_redis_timeout(),
        }
    }
}

impl RedisSettings {
    /// `redis://[:password@]host:port/db`
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

/// In-process cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: default_max_entries(),
        }
    }
}

/// Where datasource schema files live.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasourceSettings {
    /// Directories searched, in order, for `<name>.json`.
    #[serde(default = "default_schema_paths")]
    pub paths: Vec<PathBuf>,
}

impl Default for DatasourceSettings {
    fn default() -> Self {
        Self {
            paths: default_schema_paths(),
        }
    }
}

/// Outbound HTTP settings, shared by token and provider requests.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    /// Whole-request timeout in seconds (default: 10).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Connect timeout in seconds (default: 5).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ttl() -> u64 {
    300
}

/// Default cache root: `~/.cache/mimir`.
fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("mimir")
}

fn default_extension() -> String {
    "json".to_string()
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_redis_timeout() -> u64 {
    1_000
}

fn default_max_entries() -> u64 {
    DEFAULT_MAX_ENTRIES
}

fn default_schema_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("workspace/datasources")]
}

fn default_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MimirError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            MimirError::Configuration(msg) => {
                MimirError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| MimirError::Configuration(format!("Failed to parse config: {e}")))
    }

    /// Caching is on globally and not overridden by debug mode.
    pub fn caching_enabled(&self) -> bool {
        self.caching.enabled && !self.debug
    }

    /// Build the shared HTTP client with the configured timeouts.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.http.timeout_secs))
            .connect_timeout(Duration::from_secs(self.http.connect_timeout_secs))
            .build()
            .map_err(|e| MimirError::Configuration(format!("failed to build HTTP client: {e}")))
    }
}
