//! Configuration management for the demo acknowledgment server.
//!
//! Handles loading and validation of server configuration from TOML files
//! and command-line overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

fn default_bind_address() -> String {
    "127.0.0.1:8090".to_string()
}

fn default_max_connections() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration settings
    #[serde(default)]
    pub server: ServerSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:8090")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to emit JSON-formatted log lines
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file, creating a default file when
    /// none exists yet.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            let config = AppConfig::default();
            let rendered = toml::to_string_pretty(&config)?;
            tokio::fs::write(path, rendered).await?;
            info!("🔧 Created default configuration at: {}", path.display());
            return Ok(config);
        }

        let raw = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Validates the merged configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.is_empty() {
            return Err("server.bind_address must not be empty".to_string());
        }
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "server.bind_address '{}' is not a valid socket address",
                self.server.bind_address
            ));
        }
        if self.server.max_connections == 0 {
            return Err("server.max_connections must be greater than zero".to_string());
        }
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_produces_defaults_and_writes_them() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:8090");
        assert!(path.exists());

        // A second load reads the file that was just written.
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.server.max_connections, 256);
    }

    #[tokio::test]
    async fn partial_files_fill_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[server]\nbind_address = \"0.0.0.0:9000\"\n")
            .await
            .unwrap();

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:9000");
        assert_eq!(config.server.max_connections, 256);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn validation_rejects_bad_settings() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.server.bind_address = "not an address".to_string();
        assert!(config.validate().is_err());

        config.server.bind_address = default_bind_address();
        config.logging.level = "noisy".to_string();
        assert!(config.validate().is_err());
    }
}
