//! Axum-based registry server.
//!
//! [`RegistryServer`] wires storage, the health monitor, and the HTTP
//! surface into a running service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/heartbeat` | Agent status updates. |
//! | `POST` | `/agents/register_with_metadata` | Registration with metadata. |
//! | `GET`  | `/agents` | Service discovery with filtering. |
//! | `GET`  | `/capabilities` | Capability discovery with search. |
//! | `GET`  | `/health` | Service health. |
//! | `GET`  | `/health/{agent_id}` | Per-agent health. |
//! | `GET`  | `/metrics` | Registry metrics (JSON). |
//! | `GET`  | `/metrics/prometheus` | Prometheus exposition. |
//! | `POST` | `/mcp` | JSON-RPC tool mirror of the above. |

use axum::{
    Json, Router,
    routing::{delete, get, post},
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{RegistryError, RegistryResult};
use crate::handlers;
use crate::health::HealthMonitor;
use crate::mcp;
use crate::metrics::PrometheusMetrics;
use crate::state::AppState;
use crate::storage::RegistryStorage;

/// Runtime configuration for [`RegistryServer`].
#[derive(Debug, Clone)]
pub struct RegistryServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RegistryServerConfig {
    fn default() -> Self {
        Self { host: "localhost".to_string(), port: 8000 }
    }
}

/// The registry HTTP server.
pub struct RegistryServer {
    config: RegistryServerConfig,
    storage: Arc<RegistryStorage>,
}

impl RegistryServer {
    pub fn new(config: RegistryServerConfig, storage: Arc<RegistryStorage>) -> Self {
        Self { config, storage }
    }

    pub fn storage(&self) -> Arc<RegistryStorage> {
        self.storage.clone()
    }

    /// Build the axum application. Callable without binding; tests drive the
    /// returned router directly.
    pub fn build_app(&self) -> RegistryResult<Router> {
        let state = AppState::new(self.storage.clone(), PrometheusMetrics::new()?);
        Ok(build_router(state))
    }

    /// Bind and serve until `shutdown` resolves. Starts the health monitor
    /// alongside the listener and stops it on the way out.
    pub async fn serve_with_shutdown<F>(&self, shutdown: F) -> RegistryResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.build_app()?;
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| RegistryError::Unavailable(format!("cannot bind {addr}: {e}")))?;

        let monitor = HealthMonitor::spawn(self.storage.clone());
        info!(addr = %addr, "registry listening");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()));

        monitor.stop().await;
        result
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/heartbeat", post(handlers::agents::heartbeat))
        .route(
            "/agents/register_with_metadata",
            post(handlers::agents::register_with_metadata),
        )
        .route("/agents", get(handlers::agents::list_agents))
        .route("/agents/{id}", delete(handlers::agents::unregister))
        .route("/capabilities", get(handlers::capabilities::list_capabilities))
        .route("/health", get(handlers::health::service_health))
        .route("/health/{agent_id}", get(handlers::health::agent_health))
        .route("/metrics", get(handlers::metrics::metrics))
        .route("/metrics/prometheus", get(handlers::metrics::prometheus_metrics))
        .route("/mcp", post(mcp::rpc))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET / - service information document.
async fn service_info() -> Json<serde_json::Value> {
    Json(json!({
        "service": "MCP Mesh Registry Service",
        "version": env!("CARGO_PKG_VERSION"),
        "architecture": "passive pull-based (agents call the registry)",
        "endpoints": {
            "heartbeat": "POST /heartbeat",
            "register_agent": "POST /agents/register_with_metadata",
            "agents": "GET /agents",
            "capabilities": "GET /capabilities",
            "health": "GET /health",
            "agent_health": "GET /health/{agent_id}",
            "metrics": "GET /metrics",
            "prometheus": "GET /metrics/prometheus",
            "mcp": "POST /mcp",
        },
    }))
}
