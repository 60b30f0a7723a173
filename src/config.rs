//! Runtime configuration for the audiencegate sidecar.

use std::time::Duration;

/// Runtime configuration for the gate.
///
/// All parameters can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Request header carrying the comma-separated requested-audience tags.
    pub audience_header: String,

    /// Maximum JSON-RPC request body size buffered for method classification.
    /// Requests exceeding this limit receive 413 Payload Too Large.
    pub req_buffer_max: usize,

    /// Maximum bytes the streaming filter may hold while waiting for an
    /// element to complete. Exceeding it abandons filtering for the rest of
    /// the response and passes bytes through unfiltered.
    pub filter_pending_max: usize,

    /// Enable TCP_NODELAY (Nagle's algorithm disabled)
    pub tcp_nodelay: bool,

    /// TCP keepalive interval in seconds
    pub tcp_keepalive_secs: u64,

    /// Maximum concurrent connections accepted before returning 503.
    pub max_concurrent_connections: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            audience_header: "x-audience".to_string(),
            req_buffer_max: 2 * 1024 * 1024,        // 2 MB
            filter_pending_max: 10 * 1024 * 1024,   // 10 MB
            tcp_nodelay: true,
            tcp_keepalive_secs: 60,
            max_concurrent_connections: 10000,
        }
    }
}

impl GateConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// # Environment Variables
    ///
    /// - `AUDIENCEGATE_AUDIENCE_HEADER` (default: "x-audience")
    /// - `AUDIENCEGATE_REQ_BUFFER_MAX` (default: 2097152 = 2MB)
    /// - `AUDIENCEGATE_FILTER_PENDING_MAX` (default: 10485760 = 10MB)
    /// - `AUDIENCEGATE_TCP_NODELAY` (default: true)
    /// - `AUDIENCEGATE_TCP_KEEPALIVE_SECS` (default: 60)
    /// - `AUDIENCEGATE_MAX_CONCURRENT_CONNECTIONS` (default: 10000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            audience_header: std::env::var("AUDIENCEGATE_AUDIENCE_HEADER")
                .map(|h| h.to_ascii_lowercase())
                .unwrap_or(defaults.audience_header),
            req_buffer_max: env_parse("AUDIENCEGATE_REQ_BUFFER_MAX", defaults.req_buffer_max),
            filter_pending_max: env_parse(
                "AUDIENCEGATE_FILTER_PENDING_MAX",
                defaults.filter_pending_max,
            ),
            tcp_nodelay: env_parse("AUDIENCEGATE_TCP_NODELAY", defaults.tcp_nodelay),
            tcp_keepalive_secs: env_parse(
                "AUDIENCEGATE_TCP_KEEPALIVE_SECS",
                defaults.tcp_keepalive_secs,
            ),
            max_concurrent_connections: env_parse(
                "AUDIENCEGATE_MAX_CONCURRENT_CONNECTIONS",
                defaults.max_concurrent_connections,
            ),
        }
    }

    /// TCP keepalive interval as a [`Duration`].
    pub fn tcp_keepalive(&self) -> Duration {
        Duration::from_secs(self.tcp_keepalive_secs)
    }
}

/// Parse an environment variable, falling back to the default on absence
/// or parse failure.
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
