use std::fmt;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Upstream admin API configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Base URL of the admin API, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request. Required.
    #[serde(default)]
    pub token: String,

    /// Which wire shape the upstream speaks.
    #[serde(default)]
    pub variant: ApiVariant,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Upper bound on pages fetched for one paginated call.
    /// A server that never signals the last page fails the call once this is hit.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: String::new(),
            variant: ApiVariant::default(),
            timeout_secs: default_timeout_secs(),
            max_pages: default_max_pages(),
        }
    }
}

// Keep the token out of logs and panics.
impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("variant", &self.variant)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

impl ApiConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::Validation(
                "api.token is required (set CURSOR_API_TOKEN)".into(),
            ));
        }

        let url = url::Url::parse(&self.base_url).map_err(|e| {
            ConfigError::Validation(format!("api.base_url '{}' is invalid: {e}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "api.base_url must be http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "api.timeout_secs must be at least 1".into(),
            ));
        }
        if self.max_pages == 0 {
            return Err(ConfigError::Validation(
                "api.max_pages must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Wire shape of the upstream API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiVariant {
    /// Paginated POST endpoints under `/teams/*` with millisecond-epoch dates.
    #[default]
    Teams,
    /// Flat GET endpoints under `/admin/*`.
    Legacy,
}

impl std::str::FromStr for ApiVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "teams" => Ok(Self::Teams),
            "legacy" => Ok(Self::Legacy),
            other => Err(ConfigError::Validation(format!(
                "unknown api variant '{other}' (expected 'teams' or 'legacy')"
            ))),
        }
    }
}

fn default_base_url() -> String {
    "https://api.cursor.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_pages() -> u32 {
    1000
}
