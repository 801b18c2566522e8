//! Configuration file handling for vgw-cli

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vgw_client::ClientConfig;

/// Configuration for the CLI tool
///
/// ```toml
/// no_color = false
///
/// [gateway]
/// host = "192.168.1.10"
/// event_port = 9000
/// http_base_url = "http://192.168.1.10:8080/"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Connection settings
    #[serde(default)]
    pub gateway: ClientConfig,
    /// Disable colored output
    pub no_color: Option<bool>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.gateway.validate()?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("vgw-cli");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        &self,
        host: Option<&str>,
        port: Option<u16>,
        api: Option<&str>,
        no_color: bool,
    ) -> MergedConfig {
        let mut client = self.gateway.clone();
        if let Some(host) = host {
            client.host = host.to_string();
        }
        if let Some(port) = port {
            client.event_port = port;
        }
        if let Some(api) = api {
            client.http_base_url = api.to_string();
        }

        MergedConfig {
            client,
            no_color: no_color || self.no_color.unwrap_or(false),
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub client: ClientConfig,
    pub no_color: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_args_override_file() {
        let config = Config::parse(
            r#"
            no_color = true

            [gateway]
            host = "10.0.0.2"
            event_port = 9100
            "#,
        )
        .unwrap();

        let merged = config.merge_with_args(None, Some(9200), Some("http://10.0.0.2:8081/"), false);

        assert_eq!(merged.client.host, "10.0.0.2");
        assert_eq!(merged.client.event_port, 9200);
        assert_eq!(merged.client.http_base_url, "http://10.0.0.2:8081/");
        assert!(merged.no_color);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        let merged = config.merge_with_args(None, None, None, false);

        assert_eq!(merged.client, ClientConfig::default());
        assert!(!merged.no_color);
    }

    #[test]
    fn test_invalid_gateway_section() {
        assert!(Config::parse("[gateway]\nevent_port = 0\n").is_err());
    }
}
