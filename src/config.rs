use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the API listens on
    #[serde(default = "Config::default_bind_addr")]
    pub bind_addr: String,
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
    /// Directory holding the sqlite database file
    #[serde(default = "Config::default_database_dir")]
    pub database_dir: String,
    /// Tracking/reconciliation configuration
    #[serde(default)]
    pub tracking: TrackingConfig,
}

/// Configuration for viewer reconciliation sessions
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Interval in seconds between full snapshot polls (default: 30)
    #[serde(default = "TrackingConfig::default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Path of the persisted selected-schedule file used by local viewer
    /// sessions (default: selection.json)
    #[serde(default = "TrackingConfig::default_selection_file")]
    pub selection_file: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: Self::default_poll_interval_secs(),
            selection_file: Self::default_selection_file(),
        }
    }
}

impl TrackingConfig {
    fn default_poll_interval_secs() -> u64 {
        30
    }
    fn default_selection_file() -> String {
        "selection.json".to_string()
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }
}

impl Config {
    fn default_bind_addr() -> String {
        "0.0.0.0:3000".to_string()
    }
    fn default_database_dir() -> String {
        "database".to_string()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}
