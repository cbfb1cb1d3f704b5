//! Bus configuration.
//!
//! Supports YAML file and environment variable overrides.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Env var naming the config file (default `fifobus.yaml`).
pub const CONFIG_ENV_VAR: &str = "FIFOBUS_CONFIG";

/// Bus configuration shared by publishers, subscribers, and the worker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Location of the shared event-log file.
    pub log_path: PathBuf,
    /// Directory holding one wakeup FIFO per live subscriber.
    pub wakeup_path: PathBuf,
    /// Retention window for trimming and the default replay start.
    pub backlog_seconds: f64,
    /// Upper bound on a single wakeup wait, so cancellation latency stays
    /// bounded even when nothing is published.
    pub poll_timeout_ms: u64,
    /// Marks an instance living inside a request-serving host; such an
    /// instance refuses to start worker roles.
    pub request_scoped: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("events.bin"),
            wakeup_path: PathBuf::from("wakeup.fifo"),
            backlog_seconds: 0.1,
            poll_timeout_ms: 1000,
            request_scoped: false,
        }
    }
}

impl BusConfig {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| "fifobus.yaml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("FIFOBUS_LOG_PATH") {
            self.log_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("FIFOBUS_WAKEUP_PATH") {
            self.wakeup_path = PathBuf::from(path);
        }

        if let Ok(secs) = std::env::var("FIFOBUS_BACKLOG_SECONDS") {
            if let Ok(s) = secs.parse() {
                self.backlog_seconds = s;
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}': {1}")]
    FileRead(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BusConfig::default();
        assert_eq!(config.log_path, PathBuf::from("events.bin"));
        assert_eq!(config.wakeup_path, PathBuf::from("wakeup.fifo"));
        assert_eq!(config.backlog_seconds, 0.1);
        assert_eq!(config.poll_timeout_ms, 1000);
        assert!(!config.request_scoped);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
log_path: /var/run/bus/events.bin
wakeup_path: /var/run/bus/wakeup.fifo
backlog_seconds: 2.5
poll_timeout_ms: 250
"#;

        let config: BusConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.log_path, PathBuf::from("/var/run/bus/events.bin"));
        assert_eq!(config.backlog_seconds, 2.5);
        assert_eq!(config.poll_timeout_ms, 250);
        // Unspecified fields fall back to defaults.
        assert!(!config.request_scoped);
    }

    #[test]
    fn test_parse_partial_yaml_keeps_defaults() {
        let config: BusConfig = serde_yaml::from_str("backlog_seconds: 30.0").unwrap();
        assert_eq!(config.backlog_seconds, 30.0);
        assert_eq!(config.log_path, PathBuf::from("events.bin"));
    }
}
