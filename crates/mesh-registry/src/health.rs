//! Timer-driven passive health monitor.
//!
//! A single scheduled task walks the registered agents on a fixed interval
//! and demotes the silent ones (`healthy` → `degraded` → `expired`) based on
//! the thresholds assigned at registration. The monitor never contacts
//! agents; recovery happens only when an agent sends a heartbeat.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::storage::RegistryStorage;

/// Handle to the background health scan task.
pub struct HealthMonitor {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl HealthMonitor {
    /// Spawn the monitor, ticking at the storage's configured interval.
    pub fn spawn(storage: Arc<RegistryStorage>) -> Self {
        let interval = Duration::from_secs(storage.health_config().check_interval);
        Self::spawn_with_interval(storage, interval)
    }

    pub fn spawn_with_interval(storage: Arc<RegistryStorage>, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Ticks must not overlap or pile up behind a slow scan.
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick fires immediately; skip it

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match storage.check_health_and_evict().await {
                            Ok(evicted) if !evicted.is_empty() => {
                                info!(count = evicted.len(), "health monitor marked agents expired");
                            }
                            Ok(_) => {}
                            Err(err) => error!(error = %err, "health scan failed"),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("health monitor stopped");
        });

        Self { shutdown, handle }
    }

    /// Stop the monitor and wait for the task to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RegistryStore;
    use mesh_kernel::registration::HealthThresholds;
    use mesh_kernel::{AgentRegistration, AgentStatus, Capability, HealthConfiguration};

    #[tokio::test]
    async fn monitor_demotes_silent_agent() {
        let store = RegistryStore::open_in_memory().await.unwrap();
        // Zero thresholds: any heartbeat silence at all demotes immediately.
        let mut config = HealthConfiguration::default();
        config.default_thresholds = HealthThresholds { timeout_threshold: 0, eviction_threshold: 0 };
        config.per_type.clear();
        let storage = Arc::new(RegistryStorage::new(store).with_health_config(config));

        let mut agent = AgentRegistration::new("a", "a", "http://localhost:0/a");
        agent.capabilities.push(Capability::new("x"));
        storage.register_agent(agent).await.unwrap();
        storage.update_heartbeat("a").await.unwrap();

        let monitor =
            HealthMonitor::spawn_with_interval(storage.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(120)).await;
        monitor.stop().await;

        let status = storage.get_agent("a").await.unwrap().status;
        assert_eq!(status, AgentStatus::Expired);
    }
}
