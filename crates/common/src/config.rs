//! Service configuration types.

use serde::{Deserialize, Serialize};

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Redis connection URL for the cache substrate.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Base URL of the coordinate transform service.
    #[serde(default = "default_coordinator_url")]
    pub coordinator_url: String,

    /// Timeout for upstream provider requests (seconds).
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Timeout for coordinate transform requests (seconds).
    #[serde(default = "default_coordinator_timeout")]
    pub coordinator_timeout_secs: u64,

    /// User-Agent header sent with outbound requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".into()
}

fn default_coordinator_url() -> String {
    "http://127.0.0.1:8787".into()
}

fn default_http_timeout() -> u64 {
    10
}

fn default_coordinator_timeout() -> u64 {
    1
}

fn default_user_agent() -> String {
    "swx-events/0.1 (event aggregation; contact@example.com)".into()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            coordinator_url: default_coordinator_url(),
            http_timeout_secs: default_http_timeout(),
            coordinator_timeout_secs: default_coordinator_timeout(),
            user_agent: default_user_agent(),
        }
    }
}
