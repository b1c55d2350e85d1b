//! Server configuration.

use eventgate_core::AppConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Server-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Host to bind to.
    pub host: String,
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// Pipeline settings shared by every step.
    pub pipeline: AppConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "0.0.0.0".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            pipeline: AppConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Default server settings with the pipeline read from the environment.
    pub fn from_env() -> Self {
        Self {
            pipeline: AppConfig::from_env(),
            ..Self::default()
        }
    }

    /// Sets the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Socket address to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Loads configuration from a TOML file.
///
/// The file holds a `[server]` table and an optional `[pipeline]` table;
/// anything left out keeps its default.
pub fn load_config(path: impl AsRef<Path>) -> Result<ServerConfig, ConfigError> {
    let content =
        std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
    parse_config(&content)
}

/// Parses configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    let config: toml::Value =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let mut server: ServerConfig = config
        .get("server")
        .map(|v| toml::Value::try_into(v.clone()))
        .transpose()
        .map_err(|e| ConfigError::Parse(e.to_string()))?
        .unwrap_or_default();

    if let Some(pipeline) = config.get("pipeline") {
        server.pipeline = toml::Value::try_into(pipeline.clone())
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
    }

    Ok(server)
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
}
