//! Agent registration, heartbeat, and discovery endpoints.
//!
//! POST /heartbeat                      - agent status updates
//! POST /agents/register_with_metadata  - registration with capability metadata
//! GET  /agents                         - service discovery with filtering

use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use mesh_kernel::{
    AgentRegistration, AgentStatus, Capability, DiscoveryQuery, ServiceContract, normalize_name,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::error::RegistryError;
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for POST /heartbeat.
#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub agent_id: String,
    /// Status the agent claims; recorded but the registry decides.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Request body for POST /agents/register_with_metadata.
#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub agent_id: String,
    pub metadata: Value,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Query parameters for GET /agents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentsParams {
    pub namespace: Option<String>,
    pub status: Option<String>,
    pub capability: Option<String>,
    pub capability_category: Option<String>,
    pub capability_stability: Option<String>,
    /// Comma-separated tag list.
    pub capability_tags: Option<String>,
    /// `key=value,key=value` label selectors.
    pub label_selector: Option<String>,
    #[serde(default)]
    pub fuzzy_match: bool,
    pub version_constraint: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /heartbeat
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<HeartbeatRequest>,
) -> Result<impl IntoResponse, RegistryError> {
    if request.agent_id.is_empty() {
        return Err(RegistryError::InvalidInput("agent_id must not be empty".into()));
    }

    let resource_version = state.storage.update_heartbeat(&request.agent_id).await?;
    tracing::debug!(agent_id = %request.agent_id, claimed = ?request.status, "heartbeat recorded");

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "resource_version": resource_version,
            "timestamp": state.storage.now().to_rfc3339(),
            "message": "Heartbeat recorded",
        })),
    ))
}

/// POST /agents/register_with_metadata
pub async fn register_with_metadata(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterAgentRequest>,
) -> Result<impl IntoResponse, RegistryError> {
    if request.agent_id.is_empty() {
        return Err(RegistryError::InvalidInput("agent_id must not be empty".into()));
    }
    if !request.metadata.is_object() {
        return Err(RegistryError::InvalidInput("metadata must be an object".into()));
    }

    let registration = build_registration(&request)?;
    let contract = parse_contract(&request.metadata)?;

    let registered = state.storage.register_agent(registration).await?;

    if let Some(contract) = contract {
        state.storage.store().store_contract(&registered.id, &contract).await?;
    }

    tracing::info!(agent_id = %registered.id, name = %registered.name, "agent registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "agent_id": request.agent_id,
            "resource_version": registered.resource_version,
            "timestamp": state.storage.now().to_rfc3339(),
            "message": "Agent registered successfully",
        })),
    ))
}

/// DELETE /agents/{id}
pub async fn unregister(
    State(state): State<Arc<AppState>>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<impl IntoResponse, RegistryError> {
    if !state.storage.unregister_agent(&id).await? {
        return Err(RegistryError::NotFound(format!("agent {id}")));
    }
    Ok((StatusCode::OK, Json(json!({ "status": "success", "agent_id": id }))))
}

/// GET /agents
pub async fn list_agents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AgentsParams>,
) -> Result<impl IntoResponse, RegistryError> {
    let cache_key = ResponseCache::key("/agents", &params);
    if let Some(body) = state.storage.cache().get(&cache_key) {
        return Ok(([(header::CONTENT_TYPE, "application/json")], body));
    }

    let query = discovery_query_from_params(&params)?;
    let agents = state
        .storage
        .list_agents(if query.is_empty() { None } else { Some(&query) })
        .await;

    let body = serde_json::to_string(&json!({
        "agents": agents,
        "count": agents.len(),
        "timestamp": state.storage.now().to_rfc3339(),
    }))
    .map_err(|e| RegistryError::Store(e.to_string()))?;

    state.storage.cache().put(cache_key, body.clone());
    Ok(([(header::CONTENT_TYPE, "application/json")], body))
}

// ─────────────────────────────────────────────────────────────────────────────
// Payload translation
// ─────────────────────────────────────────────────────────────────────────────

/// Build a [`DiscoveryQuery`] from validated query parameters.
pub fn discovery_query_from_params(params: &AgentsParams) -> Result<DiscoveryQuery, RegistryError> {
    let mut query = DiscoveryQuery {
        namespace: params.namespace.clone(),
        capability_category: params.capability_category.clone(),
        fuzzy_match: params.fuzzy_match,
        version_constraint: params.version_constraint.clone(),
        ..Default::default()
    };

    if let Some(status) = &params.status {
        query.status = Some(
            status
                .parse::<AgentStatus>()
                .map_err(RegistryError::InvalidInput)?,
        );
    }
    if let Some(stability) = &params.capability_stability {
        query.capability_stability = Some(
            serde_json::from_value(Value::String(stability.clone()))
                .map_err(|_| RegistryError::InvalidInput(format!("unknown stability: {stability}")))?,
        );
    }
    if let Some(capability) = &params.capability {
        query.capabilities = vec![capability.clone()];
    }
    if let Some(tags) = &params.capability_tags {
        query.capability_tags = tags.split(',').map(|t| t.trim().to_string()).collect();
    }
    if let Some(selector) = &params.label_selector {
        for part in selector.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                return Err(RegistryError::InvalidInput(format!(
                    "invalid label selector '{part}': expected key=value"
                )));
            };
            query
                .labels
                .insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    Ok(query)
}

/// Translate a registration request into an [`AgentRegistration`].
///
/// Names are normalized to the lowercase-hyphen form, non-HTTP endpoints are
/// replaced by a `http://localhost:0/{name}` placeholder (stdio transport),
/// and the originals are preserved as annotations.
pub fn build_registration(
    request: &RegisterAgentRequest,
) -> Result<AgentRegistration, RegistryError> {
    let metadata = &request.metadata;
    let get_str = |key: &str| metadata.get(key).and_then(Value::as_str);

    let original_name = get_str("name").unwrap_or(&request.agent_id).to_string();
    let original_type = get_str("agent_type").unwrap_or("mesh-agent").to_string();
    let name = normalize_name(&original_name);
    let agent_type = normalize_name(&original_type);

    let endpoint = match get_str("endpoint") {
        Some(ep) if ep.starts_with("http://") || ep.starts_with("https://") => ep.to_string(),
        // MCP stdio agents have no listening socket; record a placeholder.
        _ => format!("http://localhost:0/{name}"),
    };

    let capabilities = match metadata.get("capabilities") {
        Some(Value::Array(entries)) => entries
            .iter()
            .map(|entry| {
                serde_json::from_value::<Capability>(entry.clone())
                    .map_err(|e| RegistryError::InvalidInput(format!("invalid capability: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(RegistryError::InvalidInput("capabilities must be an array".into()));
        }
        None => Vec::new(),
    };

    let mut registration = AgentRegistration::new(request.agent_id.clone(), name.clone(), endpoint);
    registration.namespace = get_str("namespace").unwrap_or("default").to_string();
    registration.agent_type = agent_type;
    registration.capabilities = capabilities;

    if let Some(interval) = metadata.get("health_interval").and_then(Value::as_u64) {
        registration.health_interval = interval;
    }
    if let Some(Value::Array(deps)) = metadata.get("dependencies") {
        registration.dependencies = deps
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }
    if let Some(context) = get_str("security_context") {
        registration.security_context = Some(context.to_string());
    }
    if let Some(Value::Object(config)) = metadata.get("metadata") {
        registration.config = config
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
    }
    // Tags shaped as a map become Kubernetes-style labels.
    if let Some(Value::Object(tags)) = metadata.get("tags") {
        registration.labels = tags
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
            .collect();
    }

    let mut annotations = BTreeMap::new();
    annotations.insert("registered_via".to_string(), "register_with_metadata".to_string());
    annotations.insert("original_name".to_string(), original_name);
    annotations.insert("original_agent_type".to_string(), original_type);
    annotations.insert(
        "original_endpoint".to_string(),
        get_str("endpoint")
            .map(str::to_string)
            .unwrap_or_else(|| format!("stdio://{}", request.agent_id)),
    );
    if let Some(ts) = &request.timestamp {
        annotations.insert("timestamp".to_string(), ts.clone());
    }
    registration.annotations = annotations;

    let now = Utc::now();
    registration.created_at = now;
    registration.updated_at = now;

    Ok(registration)
}

/// Optional service contract carried inside the registration metadata.
fn parse_contract(metadata: &Value) -> Result<Option<ServiceContract>, RegistryError> {
    match metadata.get("contract") {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => serde_json::from_value(raw.clone())
            .map(Some)
            .map_err(|e| RegistryError::InvalidInput(format!("invalid contract: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(metadata: Value) -> RegisterAgentRequest {
        RegisterAgentRequest {
            agent_id: "hello".to_string(),
            metadata,
            timestamp: Some("2026-01-01T00:00:00Z".to_string()),
        }
    }

    #[test]
    fn names_are_normalized() {
        let req = request(json!({
            "name": "Hello_World",
            "agent_type": "mesh_agent",
            "capabilities": [{"name": "greeting", "version": "1.0.0"}],
        }));
        let reg = build_registration(&req).unwrap();
        assert_eq!(reg.name, "hello-world");
        assert_eq!(reg.agent_type, "mesh-agent");
        assert_eq!(reg.annotations["original_name"], "Hello_World");
    }

    #[test]
    fn stdio_endpoint_gets_placeholder() {
        let req = request(json!({"name": "hello", "endpoint": "stdio://hello"}));
        let reg = build_registration(&req).unwrap();
        assert_eq!(reg.endpoint, "http://localhost:0/hello");
        assert_eq!(reg.annotations["original_endpoint"], "stdio://hello");
    }

    #[test]
    fn http_endpoint_is_kept() {
        let req = request(json!({"name": "hello", "endpoint": "http://10.0.0.5:9000"}));
        let reg = build_registration(&req).unwrap();
        assert_eq!(reg.endpoint, "http://10.0.0.5:9000");
    }

    #[test]
    fn dependencies_and_interval_are_carried() {
        let req = request(json!({
            "name": "hello",
            "health_interval": 5,
            "dependencies": ["date_service", "weather_service"],
        }));
        let reg = build_registration(&req).unwrap();
        assert_eq!(reg.health_interval, 5);
        assert_eq!(reg.dependencies, vec!["date_service", "weather_service"]);
    }

    #[test]
    fn label_selector_parses_pairs() {
        let params = AgentsParams {
            label_selector: Some("env=prod, tier=gold".to_string()),
            ..Default::default()
        };
        let query = discovery_query_from_params(&params).unwrap();
        assert_eq!(query.labels["env"], "prod");
        assert_eq!(query.labels["tier"], "gold");
    }

    #[test]
    fn bad_label_selector_is_invalid_input() {
        let params = AgentsParams {
            label_selector: Some("not-a-pair".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            discovery_query_from_params(&params),
            Err(RegistryError::InvalidInput(_))
        ));
    }

    #[test]
    fn bad_status_is_invalid_input() {
        let params = AgentsParams {
            status: Some("zombie".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            discovery_query_from_params(&params),
            Err(RegistryError::InvalidInput(_))
        ));
    }
}
