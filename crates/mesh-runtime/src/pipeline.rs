//! Startup pipeline: flush declarations to the registry and heartbeat.
//!
//! [`MeshRuntime`] is the explicit entrypoint replacing import-time side
//! effects: the agent binary declares capabilities, then calls [`run`] (or
//! [`serve_with_shutdown`]) from `main`. Registration failures never abort
//! the host process — an agent without a registry still works standalone.
//!
//! [`run`]: MeshRuntime::run
//! [`serve_with_shutdown`]: MeshRuntime::serve_with_shutdown

use mesh_kernel::MeshResult;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::client::RegistryClient;
use crate::descriptor::{AgentDescriptor, CapabilityDescriptor};
use crate::env::MeshEnv;
use crate::registry::{CapabilityHandler, LocalRegistry};
use crate::resolver::DependencyResolver;

/// Delay before the first flush so user init code can finish.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Per-agent mesh runtime: declarations, registration, heartbeats.
pub struct MeshRuntime {
    agent: AgentDescriptor,
    registry: Arc<LocalRegistry>,
    client: RegistryClient,
    resolver: Arc<DependencyResolver>,
    env: MeshEnv,
    flushed: AtomicBool,
}

impl MeshRuntime {
    /// Runtime configured from the process environment.
    pub fn new(agent: AgentDescriptor) -> MeshResult<Self> {
        Self::with_env(agent, MeshEnv::from_env())
    }

    pub fn with_env(agent: AgentDescriptor, env: MeshEnv) -> MeshResult<Self> {
        let client = RegistryClient::new(env.registry_url.clone())?;
        let resolver = Arc::new(DependencyResolver::new(client.clone()));
        Ok(Self {
            agent,
            registry: Arc::new(LocalRegistry::new()),
            client,
            resolver,
            env,
            flushed: AtomicBool::new(false),
        })
    }

    /// Declare a capability backed by `handler`. Idempotent per name.
    pub fn register(
        &self,
        descriptor: CapabilityDescriptor,
        handler: Arc<dyn CapabilityHandler>,
    ) -> bool {
        self.registry.register(descriptor, handler)
    }

    pub fn resolver(&self) -> Arc<DependencyResolver> {
        self.resolver.clone()
    }

    /// Resolve every dependency the agent declared, keyed by capability.
    ///
    /// Call this at invocation time for any dependency the caller did not
    /// supply; optional dependencies resolve to `None` instead of failing.
    pub async fn resolve_dependencies(
        &self,
    ) -> MeshResult<Vec<(String, Option<Arc<dyn CapabilityHandler>>)>> {
        let mut resolved = Vec::with_capacity(self.agent.dependencies.len());
        for decl in &self.agent.dependencies {
            resolved.push((decl.capability.clone(), self.resolver.resolve_decl(decl).await?));
        }
        Ok(resolved)
    }

    pub fn registry(&self) -> Arc<LocalRegistry> {
        self.registry.clone()
    }

    pub fn client(&self) -> &RegistryClient {
        &self.client
    }

    pub fn agent_id(&self) -> &str {
        &self.agent.name
    }

    /// Send the registration payload once. Non-fatal on failure: the error
    /// is logged and the agent continues standalone.
    pub async fn flush_registration(&self) {
        if !self.env.auto_process {
            info!("auto-processing disabled; skipping registration");
            return;
        }
        if self.flushed.swap(true, Ordering::SeqCst) {
            return;
        }

        let metadata = self.agent.to_metadata(&self.registry.descriptors());
        match self
            .client
            .register_with_metadata(&self.agent.name, metadata)
            .await
        {
            Ok(ack) => {
                info!(
                    agent_id = %ack.agent_id,
                    resource_version = %ack.resource_version,
                    "registered with mesh registry"
                );
            }
            Err(err) => {
                // Standalone operation is a supported mode.
                warn!(agent_id = %self.agent.name, error = %err, "registration failed; continuing standalone");
                self.flushed.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Run the pipeline until `shutdown` resolves: settle, flush the
    /// registration, then heartbeat at the declared interval. Heartbeat
    /// failures are logged at warn and retried on the next tick.
    pub async fn serve_with_shutdown<F>(&self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::time::sleep(SETTLE_DELAY).await;
        self.flush_registration().await;

        let interval = Duration::from_secs(self.agent.health_interval.max(1));
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Re-register first if the initial flush failed.
                    if !self.flushed.load(Ordering::SeqCst) {
                        self.flush_registration().await;
                    }
                    if let Err(err) = self.client.heartbeat(&self.agent.name).await {
                        warn!(agent_id = %self.agent.name, error = %err, "heartbeat failed; will retry");
                    }
                }
                _ = &mut shutdown => {
                    info!(agent_id = %self.agent.name, "mesh runtime shutting down");
                    break;
                }
            }
        }
    }

    /// Serve until the process receives ctrl-c.
    pub async fn run(&self) {
        self.serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    }
}
