//! Configuration types for Recplay

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::matching::MatchRules;
use crate::{RecplayError, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory relative recording paths resolve against
    pub storage_location: PathBuf,
    /// Listener settings
    pub server: ServerConfig,
    /// Outbound client settings for record mode
    pub upstream: UpstreamConfig,
    /// Global match rules
    pub matching: MatchRules,
    /// Playback behaviour
    pub playback: PlaybackConfig,
    /// Resource limits
    pub limits: LimitsConfig,
    /// Install the built-in default sanitizers
    pub default_sanitizers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_location: PathBuf::from("."),
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            matching: MatchRules::default(),
            playback: PlaybackConfig::default(),
            limits: LimitsConfig::default(),
            default_sanitizers: true,
        }
    }
}

/// Listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,
    /// Port to listen on; 0 picks a free port
    pub port: u16,
    /// Maximum concurrent connections
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            max_connections: 4096,
        }
    }
}

/// Outbound client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Per-request timeout, covering the response body
    pub timeout_ms: u64,
    /// How long idle pooled connections are kept
    pub pool_idle_timeout_secs: u64,
    /// Idle connections kept per host
    pub max_idle_per_host: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            pool_idle_timeout_secs: 90,
            max_idle_per_host: 10,
        }
    }
}

impl UpstreamConfig {
    /// Request timeout as a `Duration`
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Playback behaviour
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Leave matched entries in the pool so they can match again
    pub allow_repeat_matches: bool,
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request size in bytes
    pub max_request_size: usize,
    /// Maximum response size in bytes
    pub max_response_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_size: 16 * 1024 * 1024,   // 16 MB
            max_response_size: 256 * 1024 * 1024, // 256 MB
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed or validated
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RecplayError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| RecplayError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.storage_location.as_os_str().is_empty() {
            return Err(RecplayError::ConfigError(
                "storage_location cannot be empty".to_string(),
            ));
        }

        if self.storage_location.exists() && !self.storage_location.is_dir() {
            return Err(RecplayError::ConfigError(format!(
                "storage_location is not a directory: {}",
                self.storage_location.display()
            )));
        }

        if self.server.max_connections == 0 {
            return Err(RecplayError::ConfigError(
                "server.max_connections must be > 0".to_string(),
            ));
        }

        if self.upstream.timeout_ms == 0 {
            return Err(RecplayError::ConfigError(
                "upstream.timeout_ms must be > 0".to_string(),
            ));
        }

        if self.limits.max_request_size == 0 || self.limits.max_response_size == 0 {
            return Err(RecplayError::ConfigError(
                "limits must be > 0".to_string(),
            ));
        }

        if self.matching.headers.iter().any(|name| name.trim().is_empty()) {
            return Err(RecplayError::ConfigError(
                "matching.headers cannot contain empty names".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parse() {
        let config_toml = r#"
            storage_location = "/tmp"
            default_sanitizers = false

            [server]
            port = 5001

            [matching]
            compare_bodies = false
            ignored_query_parameters = ["sig"]

            [playback]
            allow_repeat_matches = true
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.server.max_connections, 4096);
        assert!(!config.matching.compare_bodies);
        assert_eq!(config.matching.headers.len(), 3);
        assert!(config.playback.allow_repeat_matches);
        assert!(!config.default_sanitizers);
        assert_eq!(config.upstream.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "storage_location = {:?}", dir.path().display().to_string()).unwrap();
        writeln!(file, "[upstream]\ntimeout_ms = 500").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.upstream.timeout_ms, 500);
        assert_eq!(config.storage_location, dir.path());
    }

    #[test]
    fn test_invalid_configs() {
        let mut config = Config::default();
        config.server.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.upstream.timeout_ms = 0;
        assert!(config.validate().is_err());

        let file = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.storage_location = file.path().to_path_buf();
        assert!(config.validate().is_err());

        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_unparseable_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server = 5").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(RecplayError::ConfigError(_))
        ));
    }
}
