//! Configuration for the exporter.
//!
//! The exporter can run from environment variables alone, or from a TOML file
//! with `${VAR_NAME}` interpolation. Environment variables always win over file
//! values so container deployments can override a baked-in file.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! metrics_path = "/metrics"
//!
//! [api]
//! base_url = "https://api.cursor.com"
//! token = "${CURSOR_API_TOKEN}"
//! variant = "teams"
//! ```

mod api;
mod observability;
mod server;

use std::path::Path;

pub use api::*;
pub use observability::*;
use serde::{Deserialize, Serialize};
pub use server::*;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream admin API configuration.
    #[serde(default)]
    pub api: ApiConfig,

    /// Metric naming.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Environment variables read on top of (or instead of) the config file.
pub mod env {
    pub const API_URL: &str = "CURSOR_API_URL";
    pub const API_TOKEN: &str = "CURSOR_API_TOKEN";
    pub const API_VARIANT: &str = "CURSOR_API_VARIANT";
    pub const LISTEN_ADDRESS: &str = "LISTEN_ADDRESS";
    pub const METRICS_PATH: &str = "METRICS_PATH";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
}

impl ExporterConfig {
    /// Load configuration for the running process.
    ///
    /// Reads the TOML file when a path is given, then applies environment
    /// overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Io(e, path.to_path_buf()))?;
                Self::parse(&contents)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// Environment overrides are not applied here, only `${VAR}` interpolation.
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let config = Self::parse(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        toml::from_str(&expanded).map_err(ConfigError::Parse)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(url) = non_empty_env(env::API_URL) {
            self.api.base_url = url;
        }
        if let Some(token) = non_empty_env(env::API_TOKEN) {
            self.api.token = token;
        }
        if let Some(variant) = non_empty_env(env::API_VARIANT) {
            self.api.variant = variant.parse()?;
        }
        if let Some(addr) = non_empty_env(env::LISTEN_ADDRESS) {
            self.server.set_listen_address(&addr)?;
        }
        if let Some(path) = non_empty_env(env::METRICS_PATH) {
            self.server.metrics_path = path;
        }
        if let Some(level) = non_empty_env(env::LOG_LEVEL) {
            // Logging is not initialized yet, so this can only go to stderr.
            match level.parse::<LogLevel>() {
                Ok(level) => self.observability.logging.level = level,
                Err(_) => {
                    eprintln!("Invalid {} '{level}', using info", env::LOG_LEVEL);
                    self.observability.logging.level = LogLevel::Info;
                }
            }
        }
        Ok(())
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.api.validate()?;
        self.metrics.validate()?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Expand `${VAR_NAME}` references, leaving anything after a `#` untouched.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| {
        ConfigError::Validation(format!("invalid interpolation pattern: {e}"))
    })?;

    let mut lines = Vec::new();
    for line in input.lines() {
        let comment_start = line.find('#').unwrap_or(line.len());
        let (code, comment) = line.split_at(comment_start);

        let mut expanded = String::with_capacity(line.len());
        let mut cursor = 0;
        for cap in re.captures_iter(code) {
            let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            let value = std::env::var(name.as_str())
                .map_err(|_| ConfigError::EnvVarNotFound(name.as_str().to_string()))?;
            expanded.push_str(&code[cursor..whole.start()]);
            expanded.push_str(&value);
            cursor = whole.end();
        }
        expanded.push_str(&code[cursor..]);
        expanded.push_str(comment);
        lines.push(expanded);
    }

    let mut result = lines.join("\n");
    if input.ends_with('\n') {
        result.push('\n');
    }
    Ok(result)
}
