//! Telemetry metric name constants.
//!
//! Centralised metric names for the datasource pipeline. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `mimir_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `datasource`: datasource name (e.g. "makes")
//! - `backend`: cache backend: "file", "redis" or "memory"
//! - `provider`: provider name (e.g. "remote", "rss")
//! - `status`: outcome: "ok" or "error"

/// Total cache hits.
///
/// Labels: `datasource`, `backend`.
pub const CACHE_HITS_TOTAL: &str = "mimir_cache_hits_total";

/// Total cache misses, including stale entries.
///
/// Labels: `datasource`, `backend`.
pub const CACHE_MISSES_TOTAL: &str = "mimir_cache_misses_total";

/// Cache backend failures that were degraded to a miss or a skipped write.
///
/// Labels: `backend`, `operation` ("get" | "put").
pub const CACHE_ERRORS_TOTAL: &str = "mimir_cache_errors_total";

/// Token requests sent to an identity provider.
///
/// Labels: `host`, `status`.
pub const TOKEN_REFRESHES_TOTAL: &str = "mimir_token_refreshes_total";

/// Provider fetches that went to the network (cache misses only).
///
/// Labels: `provider`, `status`.
pub const FETCHES_TOTAL: &str = "mimir_fetches_total";

/// Provider fetch duration in seconds.
///
/// Labels: `provider`.
pub const FETCH_DURATION_SECONDS: &str = "mimir_fetch_duration_seconds";
