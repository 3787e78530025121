//! Shared application state for the HTTP handlers.

use std::sync::Arc;

use crate::metrics::PrometheusMetrics;
use crate::storage::RegistryStorage;

/// State injected into every axum handler via the `State` extractor.
pub struct AppState {
    pub storage: Arc<RegistryStorage>,
    pub prometheus: PrometheusMetrics,
}

impl AppState {
    pub fn new(storage: Arc<RegistryStorage>, prometheus: PrometheusMetrics) -> Arc<Self> {
        Arc::new(Self { storage, prometheus })
    }
}
