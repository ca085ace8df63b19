use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Observability configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include timestamps.
    #[serde(default = "default_true")]
    pub timestamps: bool,

    /// Include file/line information.
    #[serde(default)]
    pub file_line: bool,

    /// Filter directives (e.g., "reqwest=debug,tower_http=debug").
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            timestamps: true,
            file_line: false,
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    /// Also accepts the `warning`, `fatal` and `panic` spellings used by other
    /// exporters so existing deployments keep their LOG_LEVEL.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" | "fatal" | "panic" => Ok(LogLevel::Error),
            other => Err(ConfigError::Validation(format!(
                "unknown log level '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable multi-line format.
    Pretty,
    /// Compact single-line format.
    #[default]
    Compact,
    /// JSON format (for log aggregation).
    Json,
}

// ─────────────────────────────────────────────────────────────────────────────
// Metrics
// ─────────────────────────────────────────────────────────────────────────────

/// Metrics naming configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Prefix prepended to every exported metric name.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Histogram buckets for the scrape duration, in seconds.
    #[serde(default = "default_duration_buckets")]
    pub scrape_duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            scrape_duration_buckets: default_duration_buckets(),
        }
    }
}

impl MetricsConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let re = regex::Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$")
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        if !re.is_match(&self.namespace) {
            return Err(ConfigError::Validation(format!(
                "metrics.namespace '{}' is not a valid metric name prefix",
                self.namespace
            )));
        }

        if self.scrape_duration_buckets.is_empty()
            || self
                .scrape_duration_buckets
                .windows(2)
                .any(|pair| pair[0] >= pair[1])
        {
            return Err(ConfigError::Validation(
                "metrics.scrape_duration_buckets must be non-empty and strictly increasing"
                    .into(),
            ));
        }
        Ok(())
    }
}

fn default_namespace() -> String {
    "cursor".to_string()
}

fn default_duration_buckets() -> Vec<f64> {
    vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
}

fn default_true() -> bool {
    true
}
