//! Prometheus exposition for registry metrics.
//!
//! Gauges and counters are registered once and refreshed from the storage
//! snapshot at scrape time, then encoded with the standard text encoder.

use mesh_kernel::RegistryMetrics;
use prometheus::{Encoder, IntCounter, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::error::{RegistryError, RegistryResult};

/// Prometheus metric set for the registry service.
pub struct PrometheusMetrics {
    registry: Registry,
    agents_total: IntGauge,
    agents_by_status: IntGaugeVec,
    capabilities_total: IntGauge,
    capability_types_unique: IntGauge,
    uptime_seconds: IntGauge,
    heartbeats_processed: IntCounter,
    registrations_processed: IntCounter,
}

impl PrometheusMetrics {
    pub fn new() -> RegistryResult<Self> {
        let registry = Registry::new();

        let agents_total = IntGauge::with_opts(Opts::new(
            "mcp_registry_agents_total",
            "Total number of registered agents",
        ))
        .map_err(internal)?;
        let agents_by_status = IntGaugeVec::new(
            Opts::new("mcp_registry_agents_by_status", "Number of agents by status"),
            &["status"],
        )
        .map_err(internal)?;
        let capabilities_total = IntGauge::with_opts(Opts::new(
            "mcp_registry_capabilities_total",
            "Total number of capabilities",
        ))
        .map_err(internal)?;
        let capability_types_unique = IntGauge::with_opts(Opts::new(
            "mcp_registry_capability_types_unique",
            "Number of unique capability types",
        ))
        .map_err(internal)?;
        let uptime_seconds = IntGauge::with_opts(Opts::new(
            "mcp_registry_uptime_seconds",
            "Registry uptime in seconds",
        ))
        .map_err(internal)?;
        let heartbeats_processed = IntCounter::with_opts(Opts::new(
            "mcp_registry_heartbeats_processed_total",
            "Total heartbeats processed",
        ))
        .map_err(internal)?;
        let registrations_processed = IntCounter::with_opts(Opts::new(
            "mcp_registry_registrations_processed_total",
            "Total registrations processed",
        ))
        .map_err(internal)?;

        registry.register(Box::new(agents_total.clone())).map_err(internal)?;
        registry.register(Box::new(agents_by_status.clone())).map_err(internal)?;
        registry.register(Box::new(capabilities_total.clone())).map_err(internal)?;
        registry.register(Box::new(capability_types_unique.clone())).map_err(internal)?;
        registry.register(Box::new(uptime_seconds.clone())).map_err(internal)?;
        registry.register(Box::new(heartbeats_processed.clone())).map_err(internal)?;
        registry.register(Box::new(registrations_processed.clone())).map_err(internal)?;

        Ok(Self {
            registry,
            agents_total,
            agents_by_status,
            capabilities_total,
            capability_types_unique,
            uptime_seconds,
            heartbeats_processed,
            registrations_processed,
        })
    }

    /// Refresh from a metrics snapshot and render the exposition text.
    pub fn render(&self, snapshot: &RegistryMetrics) -> RegistryResult<String> {
        self.agents_total.set(snapshot.total_agents as i64);
        for (status, value) in [
            ("healthy", snapshot.healthy_agents),
            ("degraded", snapshot.degraded_agents),
            ("expired", snapshot.expired_agents),
            ("offline", snapshot.offline_agents),
            ("pending", snapshot.pending_agents),
        ] {
            self.agents_by_status
                .with_label_values(&[status])
                .set(value as i64);
        }
        self.capabilities_total.set(snapshot.total_capabilities as i64);
        self.capability_types_unique
            .set(snapshot.unique_capability_types as i64);
        self.uptime_seconds.set(snapshot.uptime_seconds as i64);

        // Counters only move forward; advance them to the snapshot values.
        let hb_gap = snapshot
            .heartbeats_processed
            .saturating_sub(self.heartbeats_processed.get());
        self.heartbeats_processed.inc_by(hb_gap);
        let reg_gap = snapshot
            .registrations_processed
            .saturating_sub(self.registrations_processed.get());
        self.registrations_processed.inc_by(reg_gap);

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(internal)?;
        String::from_utf8(buffer).map_err(|e| RegistryError::Store(e.to_string()))
    }
}

fn internal<E: std::fmt::Display>(err: E) -> RegistryError {
    RegistryError::Store(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_expected_families() {
        let metrics = PrometheusMetrics::new().unwrap();
        let snapshot = RegistryMetrics {
            total_agents: 2,
            healthy_agents: 1,
            pending_agents: 1,
            total_capabilities: 3,
            unique_capability_types: 2,
            heartbeats_processed: 5,
            ..Default::default()
        };
        let text = metrics.render(&snapshot).unwrap();
        assert!(text.contains("mcp_registry_agents_total 2"));
        assert!(text.contains("mcp_registry_agents_by_status{status=\"healthy\"} 1"));
        assert!(text.contains("mcp_registry_heartbeats_processed_total 5"));
    }
}
