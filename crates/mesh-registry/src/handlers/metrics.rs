//! Registry metrics endpoints.
//!
//! GET /metrics            - metrics object as JSON
//! GET /metrics/prometheus - text exposition format

use axum::{
    Json,
    extract::State,
    http::header,
    response::IntoResponse,
};
use std::sync::Arc;

use crate::error::RegistryError;
use crate::state::AppState;

/// GET /metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.storage.metrics().await)
}

/// GET /metrics/prometheus
pub async fn prometheus_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, RegistryError> {
    let snapshot = state.storage.metrics().await;
    let text = state.prometheus.render(&snapshot)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text))
}
