//! Configuration types for linkspeed

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

/// Engine behavior configuration (probe budgets, subscription handling, meters)
///
/// Per-batch parameters (concurrency, timeout, group) arrive with each batch
/// message; these settings apply to every batch the engine runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Budget handed to the latency probe for each link (default: 2s)
    #[serde(default = "default_ping_budget")]
    pub ping_budget: Duration,

    /// Timeout for fetching a subscription URL (default: 20s)
    #[serde(default = "default_subscription_timeout")]
    pub subscription_timeout: Duration,

    /// How many subscription URLs may nest inside each other (default: 3)
    #[serde(default = "default_max_subscription_depth")]
    pub max_subscription_depth: u32,

    /// File downloaded by the default throughput meter
    #[serde(default = "default_speed_test_url")]
    pub speed_test_url: String,

    /// Interval between throughput samples of the default meter (default: 1s)
    #[serde(default = "default_sample_interval")]
    pub sample_interval: Duration,

    /// Capacity of each per-link sample channel (default: 16)
    #[serde(default = "default_sample_channel_capacity")]
    pub sample_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ping_budget: default_ping_budget(),
            subscription_timeout: default_subscription_timeout(),
            max_subscription_depth: default_max_subscription_depth(),
            speed_test_url: default_speed_test_url(),
            sample_interval: default_sample_interval(),
            sample_channel_capacity: default_sample_channel_capacity(),
        }
    }
}

/// WebSocket/HTTP API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:10888)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
        }
    }
}

/// API and external server integration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerIntegrationConfig {
    /// API server settings
    #[serde(default)]
    pub api: ApiConfig,
}

/// Main configuration for the test engine
///
/// # Example
///
/// ```
/// use linkspeed::Config;
/// use std::time::Duration;
///
/// let config: Config = serde_json::from_str(r#"{"engine": {"max_subscription_depth": 1}}"#).unwrap();
/// assert_eq!(config.engine.max_subscription_depth, 1);
/// assert_eq!(config.engine.ping_budget, Duration::from_secs(2));
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Engine behavior settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Check settings that serde defaults can't guard
    pub fn validate(&self) -> crate::Result<()> {
        if self.engine.sample_channel_capacity == 0 {
            return Err(crate::Error::Config {
                message: "sample channel capacity must be at least 1".to_string(),
                key: Some("sample_channel_capacity".to_string()),
            });
        }
        if self.engine.sample_interval.is_zero() {
            return Err(crate::Error::Config {
                message: "sample interval must be positive".to_string(),
                key: Some("sample_interval".to_string()),
            });
        }
        if url::Url::parse(&self.engine.speed_test_url).is_err() {
            return Err(crate::Error::Config {
                message: format!("invalid speed test URL: {}", self.engine.speed_test_url),
                key: Some("speed_test_url".to_string()),
            });
        }
        Ok(())
    }
}

fn default_ping_budget() -> Duration {
    Duration::from_secs(2)
}

fn default_subscription_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_max_subscription_depth() -> u32 {
    3
}

fn default_speed_test_url() -> String {
    "https://speed.cloudflare.com/__down?bytes=50000000".to_string()
}

fn default_sample_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_sample_channel_capacity() -> usize {
    16
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 10888))
}

fn default_true() -> bool {
    true
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}
