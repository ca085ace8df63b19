//! Liveness and metrics endpoints.

use axum::{Json, extract::State, http::header, response::IntoResponse};
use chrono::{SecondsFormat, Utc};
use http::StatusCode;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;

use crate::AppState;

/// Liveness payload.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// Always "healthy" while the process can answer.
    pub status: &'static str,
    /// RFC 3339 time the check was answered.
    pub timestamp: String,
}

/// Liveness check. Does not touch the upstream API.
#[tracing::instrument(name = "health.check")]
pub async fn health_check() -> impl IntoResponse {
    Json(HealthStatus {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

/// Prometheus metrics endpoint.
///
/// Every request runs a full scrape against the upstream API.
#[tracing::instrument(name = "health.metrics", skip(state))]
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.exporter.scrape().await;
    let content_type = TextEncoder::new().format_type().to_string();

    match snapshot.encode() {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain".to_string())],
                format!("failed to encode metrics: {e}"),
            )
        }
    }
}
