//! Prometheus exporter for the Cursor Admin API.
//!
//! Every scrape of the metrics endpoint polls the admin API (team roster, daily
//! usage, spend and usage events) and republishes the results as gauges.

pub mod client;
pub mod collectors;
pub mod config;
pub mod exporter;
pub mod models;
pub mod observability;
pub mod routes;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::{config::ExporterConfig, exporter::Exporter};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub exporter: Arc<Exporter>,
    pub metrics_path: Arc<str>,
}

impl AppState {
    pub fn new(exporter: Exporter, config: &ExporterConfig) -> Self {
        Self {
            exporter: Arc::new(exporter),
            metrics_path: Arc::from(config.server.metrics_path.as_str()),
        }
    }
}

/// Build the HTTP router: landing page, health check and the metrics path.
pub fn build_app(config: &ExporterConfig, state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health_check))
        .route(&config.server.metrics_path, get(routes::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
