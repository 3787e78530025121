//! Capability discovery endpoint.
//!
//! GET /capabilities - capability search across agents, or the capability
//! set of a single agent when `agent_id` is given.

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use mesh_kernel::{AgentRegistration, AgentStatus, Capability, CapabilityQuery};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::error::RegistryError;
use crate::state::AppState;

/// Query parameters for GET /capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilitiesParams {
    pub agent_id: Option<String>,
    pub name: Option<String>,
    pub description_contains: Option<String>,
    pub category: Option<String>,
    /// Comma-separated tag list.
    pub tags: Option<String>,
    pub stability: Option<String>,
    pub version_constraint: Option<String>,
    #[serde(default)]
    pub fuzzy_match: bool,
    #[serde(default)]
    pub include_deprecated: bool,
    pub agent_namespace: Option<String>,
    /// Defaults to `healthy`; pass `any` to include all statuses.
    pub agent_status: Option<String>,
}

/// GET /capabilities
pub async fn list_capabilities(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CapabilitiesParams>,
) -> Result<impl IntoResponse, RegistryError> {
    let cache_key = ResponseCache::key("/capabilities", &params);
    if let Some(body) = state.storage.cache().get(&cache_key) {
        return Ok(([(header::CONTENT_TYPE, "application/json")], body));
    }

    let rows = if let Some(agent_id) = &params.agent_id {
        let agent = state
            .storage
            .get_agent(agent_id)
            .await
            .ok_or_else(|| RegistryError::NotFound(format!("agent {agent_id}")))?;
        agent
            .capabilities
            .iter()
            .filter(|cap| match &params.name {
                Some(name) => &cap.name == name,
                None => true,
            })
            .map(|cap| capability_row(cap, &agent))
            .collect::<Vec<_>>()
    } else {
        let query = capability_query_from_params(&params)?;
        let agents = state.storage.list_agents(None).await;
        let mut rows = Vec::new();
        for agent in &agents {
            if !query.matches_agent(agent) {
                continue;
            }
            for cap in &agent.capabilities {
                if query.matches_capability(cap) {
                    rows.push(capability_row(cap, agent));
                }
            }
        }
        rows
    };

    let body = serde_json::to_string(&json!({
        "capabilities": rows,
        "count": rows.len(),
        "timestamp": state.storage.now().to_rfc3339(),
    }))
    .map_err(|e| RegistryError::Store(e.to_string()))?;

    state.storage.cache().put(cache_key, body.clone());
    Ok(([(header::CONTENT_TYPE, "application/json")], body))
}

/// A capability serialized with its owning agent's coordinates attached.
fn capability_row(cap: &Capability, agent: &AgentRegistration) -> Value {
    let mut row = serde_json::to_value(cap).unwrap_or_default();
    if let Value::Object(map) = &mut row {
        map.insert("agent_id".into(), json!(agent.id));
        map.insert("agent_name".into(), json!(agent.name));
        map.insert("agent_namespace".into(), json!(agent.namespace));
        map.insert("agent_status".into(), json!(agent.status));
        map.insert("agent_endpoint".into(), json!(agent.endpoint));
    }
    row
}

fn capability_query_from_params(
    params: &CapabilitiesParams,
) -> Result<CapabilityQuery, RegistryError> {
    let mut query = CapabilityQuery {
        name: params.name.clone(),
        description_contains: params.description_contains.clone(),
        category: params.category.clone(),
        version_constraint: params.version_constraint.clone(),
        fuzzy_match: params.fuzzy_match,
        include_deprecated: params.include_deprecated,
        agent_namespace: params.agent_namespace.clone(),
        ..Default::default()
    };
    if let Some(tags) = &params.tags {
        query.tags = tags.split(',').map(|t| t.trim().to_string()).collect();
    }
    if let Some(stability) = &params.stability {
        query.stability = Some(
            serde_json::from_value(Value::String(stability.clone()))
                .map_err(|_| RegistryError::InvalidInput(format!("unknown stability: {stability}")))?,
        );
    }
    match params.agent_status.as_deref() {
        None => {} // keep the healthy default
        Some("any") => query.agent_status = None,
        Some(status) => {
            query.agent_status = Some(
                status
                    .parse::<AgentStatus>()
                    .map_err(RegistryError::InvalidInput)?,
            );
        }
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_filter_is_healthy() {
        let query = capability_query_from_params(&CapabilitiesParams::default()).unwrap();
        assert_eq!(query.agent_status, Some(AgentStatus::Healthy));
    }

    #[test]
    fn any_status_disables_the_filter() {
        let params = CapabilitiesParams {
            agent_status: Some("any".to_string()),
            ..Default::default()
        };
        let query = capability_query_from_params(&params).unwrap();
        assert_eq!(query.agent_status, None);
    }

    #[test]
    fn tags_split_on_commas() {
        let params = CapabilitiesParams {
            tags: Some("files, io".to_string()),
            ..Default::default()
        };
        let query = capability_query_from_params(&params).unwrap();
        assert_eq!(query.tags, vec!["files", "io"]);
    }
}
