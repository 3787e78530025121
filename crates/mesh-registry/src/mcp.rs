//! JSON-RPC tool surface mounted at `/mcp`.
//!
//! Exposes the registry operations as named tools over a JSON-RPC 2.0 POST
//! endpoint, mirroring the HTTP endpoints: `register_agent`,
//! `unregister_agent`, `discover_services`, `heartbeat`, `get_agent_status`,
//! `drain_agent`, and `get_agent_health`. Agents that already speak the
//! embedded protocol can use this surface instead of the REST one; the two
//! are equivalent.

use axum::{Json, extract::State, response::IntoResponse};
use mesh_kernel::DiscoveryQuery;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::error::RegistryError;
use crate::handlers::agents::{RegisterAgentRequest, build_registration};
use crate::state::AppState;

const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn rpc_result(id: Option<Value>, result: Value) -> Value {
    json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "result": result })
}

fn rpc_error(id: Option<Value>, code: i64, message: String) -> Value {
    json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "error": { "code": code, "message": message } })
}

fn error_code(err: &RegistryError) -> i64 {
    match err {
        RegistryError::InvalidInput(_) => -32602,
        RegistryError::NotFound(_) => -32001,
        RegistryError::SecurityValidation(_) => -32002,
        RegistryError::Store(_) | RegistryError::Unavailable(_) => -32000,
    }
}

/// POST /mcp
pub async fn rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RpcRequest>,
) -> impl IntoResponse {
    let id = request.id.clone();
    let response = match dispatch(&state, &request).await {
        Ok(result) => rpc_result(id, result),
        Err(err) => rpc_error(id, error_code(&err), err.to_string()),
    };
    Json(response)
}

async fn dispatch(state: &AppState, request: &RpcRequest) -> Result<Value, RegistryError> {
    match request.method.as_str() {
        "register_agent" => {
            let payload: RegisterAgentRequest = serde_json::from_value(request.params.clone())
                .map_err(|e| RegistryError::InvalidInput(e.to_string()))?;
            let registration = build_registration(&payload)?;
            let registered = state.storage.register_agent(registration).await?;
            Ok(json!({
                "status": "success",
                "agent_id": payload.agent_id,
                "resource_version": registered.resource_version,
            }))
        }
        "unregister_agent" => {
            let agent_id = param_str(&request.params, "agent_id")?;
            if !state.storage.unregister_agent(&agent_id).await? {
                return Err(RegistryError::NotFound(format!("agent {agent_id}")));
            }
            Ok(json!({ "status": "success", "agent_id": agent_id }))
        }
        "discover_services" => {
            let query: DiscoveryQuery = serde_json::from_value(request.params.clone())
                .map_err(|e| RegistryError::InvalidInput(e.to_string()))?;
            let agents = state
                .storage
                .list_agents(if query.is_empty() { None } else { Some(&query) })
                .await;
            Ok(json!({ "status": "success", "agents": agents, "count": agents.len() }))
        }
        "heartbeat" => {
            let agent_id = param_str(&request.params, "agent_id")?;
            let version = state.storage.update_heartbeat(&agent_id).await?;
            Ok(json!({
                "status": "success",
                "resource_version": version,
                "timestamp": state.storage.now().to_rfc3339(),
            }))
        }
        "get_agent_status" => {
            let agent_id = param_str(&request.params, "agent_id")?;
            let agent = state
                .storage
                .get_agent(&agent_id)
                .await
                .ok_or_else(|| RegistryError::NotFound(format!("agent {agent_id}")))?;
            Ok(json!({ "status": "success", "agent": agent }))
        }
        "drain_agent" => {
            let agent_id = param_str(&request.params, "agent_id")?;
            let version = state.storage.drain_agent(&agent_id).await?;
            Ok(json!({
                "status": "success",
                "agent_id": agent_id,
                "resource_version": version,
            }))
        }
        "get_agent_health" => {
            let agent_id = param_str(&request.params, "agent_id")?;
            let report = state
                .storage
                .agent_health(&agent_id)
                .await
                .ok_or_else(|| RegistryError::NotFound(format!("agent {agent_id}")))?;
            Ok(serde_json::to_value(report).unwrap_or_default())
        }
        other => Err(RegistryError::InvalidInput(format!("unknown method: {other}"))),
    }
}

fn param_str(params: &Value, key: &str) -> Result<String, RegistryError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RegistryError::InvalidInput(format!("missing parameter: {key}")))
}
