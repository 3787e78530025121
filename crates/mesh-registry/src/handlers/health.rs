//! Service and per-agent health endpoints.
//!
//! GET /health            - service health (store reachability)
//! GET /health/{agent_id} - heartbeat-derived health for one agent

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::state::AppState;

/// GET /health
pub async fn service_health(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, RegistryError> {
    state
        .storage
        .store()
        .stats()
        .await
        .map_err(|e| RegistryError::Unavailable(format!("store unreachable: {e}")))?;

    Ok(Json(json!({
        "status": "healthy",
        "service": "mcp-mesh-registry",
    })))
}

/// GET /health/{agent_id}
pub async fn agent_health(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<impl IntoResponse, RegistryError> {
    let report = state
        .storage
        .agent_health(&agent_id)
        .await
        .ok_or_else(|| RegistryError::NotFound(format!("agent {agent_id}")))?;
    Ok(Json(report))
}
