//! Player configuration
//!
//! Every field has a default matching the public MeTMusic deployment, so an
//! empty TOML document (or `PlayerConfig::default()`) is a working setup.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default push channel endpoint
pub const DEFAULT_LISTEN_URL: &str = "wss://music.met6.top:444/api-client/ws/listen";

/// Default track resolution service
pub const DEFAULT_RESOLVE_BASE_URL: &str = "https://music.met6.top:444";

/// Highest quality tier the resolution service offers
pub const DEFAULT_QUALITY: &str = "hq";

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Full player configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub feed: FeedConfig,
    pub resolver: ResolverConfig,
    pub sync: SyncConfig,
}

/// Push channel settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// WebSocket endpoint of the broadcast service
    pub url: String,
    /// Fixed delay before each reconnect attempt
    pub reconnect_delay_ms: u64,
    /// Upper bound on a single connect and subscribe attempt
    pub connect_timeout_ms: u64,
    /// Silence after which a "playing" feed is considered stale
    pub liveness_timeout_ms: u64,
    /// How often staleness is checked
    pub liveness_tick_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_LISTEN_URL.to_string(),
            reconnect_delay_ms: 5000,
            connect_timeout_ms: 10_000,
            liveness_timeout_ms: 12_000,
            liveness_tick_ms: 1000,
        }
    }
}

impl FeedConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    pub fn liveness_tick(&self) -> Duration {
        Duration::from_millis(self.liveness_tick_ms.max(1))
    }
}

/// Track resolution service settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub base_url: String,
    pub quality: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_RESOLVE_BASE_URL.to_string(),
            quality: DEFAULT_QUALITY.to_string(),
            connect_timeout_ms: 5000,
            request_timeout_ms: 10_000,
        }
    }
}

/// Synchronizer tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Start instant jitter tolerated before a feedback counts as a new identity
    pub identity_tolerance_ms: f64,
    /// Period of the drift correction loop
    pub drift_interval_ms: u64,
    /// Deviation (seconds) above which the device is forced back onto the timeline
    pub drift_threshold_secs: f64,
    /// Lower bound for the preload lead time
    pub preload_floor_ms: f64,
    /// Assumed load time before any sample exists
    pub default_load_ms: f64,
    /// Number of load latency samples kept for averaging
    pub latency_window: usize,
    /// Volume applied to the device at start (0.0 - 1.0)
    pub initial_volume: f32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            identity_tolerance_ms: 500.0,
            drift_interval_ms: 1000,
            drift_threshold_secs: 0.5,
            preload_floor_ms: 500.0,
            default_load_ms: 2000.0,
            latency_window: 5,
            initial_volume: 1.0,
        }
    }
}

impl SyncConfig {
    pub fn drift_interval(&self) -> Duration {
        Duration::from_millis(self.drift_interval_ms.max(1))
    }
}

impl PlayerConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
