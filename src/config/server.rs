use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path the metrics snapshot is served on.
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            metrics_path: default_metrics_path(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Apply a `LISTEN_ADDRESS` style value.
    ///
    /// Accepts `ip:port`, `[v6]:port`, `hostname:port`, or a bare `:port` which
    /// binds all interfaces. Hostnames are resolved once, to their first address.
    pub fn set_listen_address(&mut self, value: &str) -> Result<(), ConfigError> {
        let addr = match value.strip_prefix(':') {
            Some(port) => {
                let port = port.parse::<u16>().map_err(|_| {
                    ConfigError::Validation(format!("invalid listen address '{value}'"))
                })?;
                SocketAddr::new(default_host(), port)
            }
            None => value
                .to_socket_addrs()
                .map_err(|e| {
                    ConfigError::Validation(format!("invalid listen address '{value}': {e}"))
                })?
                .next()
                .ok_or_else(|| {
                    ConfigError::Validation(format!("listen address '{value}' did not resolve"))
                })?,
        };
        self.host = addr.ip();
        self.port = addr.port();
        Ok(())
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let path = self.metrics_path.as_str();
        if !path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "server.metrics_path must start with '/': {path}"
            )));
        }
        if path == "/" || path == "/health" {
            return Err(ConfigError::Validation(format!(
                "server.metrics_path '{path}' collides with a built-in route"
            )));
        }
        Ok(())
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}
