//! HTTP client for the mesh registry service.

use mesh_kernel::{AgentRegistration, HealthReport, MeshError, MeshResult};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::env::DEFAULT_REGISTRY_URL;

/// Default wall-clock budget per registry call.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Acknowledgement returned by the registration endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterAck {
    pub agent_id: String,
    pub resource_version: String,
}

#[derive(Debug, Deserialize)]
struct AgentsEnvelope {
    agents: Vec<AgentRegistration>,
}

#[derive(Debug, Deserialize)]
struct CapabilitiesEnvelope {
    capabilities: Vec<Value>,
}

/// Client for communicating with the mesh registry.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    http: reqwest::Client,
}

impl RegistryClient {
    /// Client against an explicit registry URL.
    pub fn new(base_url: impl Into<String>) -> MeshResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> MeshResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MeshError::RegistryConnection(e.to_string()))?;
        let mut base_url = base_url.into();
        if base_url.is_empty() {
            base_url = DEFAULT_REGISTRY_URL.to_string();
        }
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST /agents/register_with_metadata
    pub async fn register_with_metadata(
        &self,
        agent_id: &str,
        metadata: Value,
    ) -> MeshResult<RegisterAck> {
        let payload = serde_json::json!({
            "agent_id": agent_id,
            "metadata": metadata,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        let response = self
            .http
            .post(format!("{}/agents/register_with_metadata", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response, "registration").await?;
        response
            .json::<RegisterAck>()
            .await
            .map_err(|e| MeshError::RegistryConnection(format!("malformed ack: {e}")))
    }

    /// POST /heartbeat
    pub async fn heartbeat(&self, agent_id: &str) -> MeshResult<()> {
        let payload = serde_json::json!({ "agent_id": agent_id });
        let response = self
            .http
            .post(format!("{}/heartbeat", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(request_error)?;
        check_status(response, "heartbeat").await?;
        debug!(agent_id, "heartbeat acknowledged");
        Ok(())
    }

    /// GET /agents with raw query parameters.
    pub async fn list_agents(&self, params: &[(&str, &str)]) -> MeshResult<Vec<AgentRegistration>> {
        let response = self
            .http
            .get(format!("{}/agents", self.base_url))
            .query(params)
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response, "discovery").await?;
        let envelope: AgentsEnvelope = response
            .json()
            .await
            .map_err(|e| MeshError::RegistryConnection(format!("malformed agent list: {e}")))?;
        Ok(envelope.agents)
    }

    /// GET /capabilities with raw query parameters.
    pub async fn list_capabilities(&self, params: &[(&str, &str)]) -> MeshResult<Vec<Value>> {
        let response = self
            .http
            .get(format!("{}/capabilities", self.base_url))
            .query(params)
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response, "capability search").await?;
        let envelope: CapabilitiesEnvelope = response
            .json()
            .await
            .map_err(|e| MeshError::RegistryConnection(format!("malformed capability list: {e}")))?;
        Ok(envelope.capabilities)
    }

    /// GET /health/{agent_id}
    pub async fn agent_health(&self, agent_id: &str) -> MeshResult<HealthReport> {
        let response = self
            .http
            .get(format!("{}/health/{agent_id}", self.base_url))
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response, "health").await?;
        response
            .json::<HealthReport>()
            .await
            .map_err(|e| MeshError::RegistryConnection(format!("malformed health report: {e}")))
    }

    /// GET /health - true when the registry answers healthy.
    pub async fn is_available(&self) -> bool {
        match self.http.get(format!("{}/health", self.base_url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Poll at ~1 Hz until the named agent reports healthy or the deadline
    /// passes.
    pub async fn wait_until_healthy(&self, agent_id: &str, timeout: Duration) -> MeshResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(report) = self.agent_health(agent_id).await {
                if report.status == mesh_kernel::AgentStatus::Healthy {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(MeshError::RegistryTimeout(format!(
                    "agent {agent_id} not healthy within {timeout:?}"
                )));
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

fn request_error(err: reqwest::Error) -> MeshError {
    if err.is_timeout() {
        MeshError::RegistryTimeout(err.to_string())
    } else {
        MeshError::RegistryConnection(err.to_string())
    }
}

async fn check_status(response: reqwest::Response, what: &str) -> MeshResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        404 => Err(MeshError::NotFound(format!("{what}: {body}"))),
        400 => Err(MeshError::InvalidInput(format!("{what}: {body}"))),
        _ => Err(MeshError::RegistryConnection(format!(
            "{what} failed with {status}: {body}"
        ))),
    }
}
