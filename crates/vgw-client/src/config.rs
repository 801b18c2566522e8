//! Client configuration
//!
//! Configuration is read from TOML. Every field has a default, so a config
//! file only needs to name what differs:
//!
//! ```toml
//! host = "192.168.0.10"
//! event_port = 9000
//! http_base_url = "http://192.168.0.10:8080/api/"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Default maximum length of a single event frame (1 MiB)
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for a [`GatewayClient`](crate::GatewayClient)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Gateway host for the event stream
    pub host: String,
    /// TCP port of the event stream
    pub event_port: u16,
    /// Base URL of the request/response API
    pub http_base_url: String,
    /// Timeout for a single request/response call
    pub request_timeout_ms: u64,
    /// Timeout for establishing connections (event stream and HTTP)
    pub connect_timeout_ms: u64,
    /// Longest accepted event frame in bytes
    pub max_frame_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            event_port: 9000,
            http_base_url: "http://127.0.0.1:8080/".to_string(),
            request_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl ClientConfig {
    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Check field values that TOML alone cannot constrain
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.event_port == 0 {
            return Err(ConfigError::Invalid("event_port must not be 0".into()));
        }
        if self.max_frame_len == 0 {
            return Err(ConfigError::Invalid("max_frame_len must not be 0".into()));
        }
        Url::parse(&self.http_base_url).map_err(|e| {
            ConfigError::Invalid(format!("http_base_url '{}': {}", self.http_base_url, e))
        })?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ClientConfig::from_toml_str("event_port = 7001\nhost = \"10.0.0.2\"\n").unwrap();
        assert_eq!(config.event_port, 7001);
        assert_eq!(config.host, "10.0.0.2");
        assert_eq!(config.max_frame_len, DEFAULT_MAX_FRAME_LEN);
    }

    #[test]
    fn test_rejects_zero_port() {
        let err = ClientConfig::from_toml_str("event_port = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let err = ClientConfig::from_toml_str("http_base_url = \"not a url\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = ClientConfig::from_toml_str("event_port = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "connect_timeout_ms = 250").unwrap();

        let config = ClientConfig::load_from(file.path()).unwrap();
        assert_eq!(config.connect_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ClientConfig::load_from("/nonexistent/vgw.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
