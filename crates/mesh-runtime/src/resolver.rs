//! Call-time dependency resolution: remote first, local fallback, cached.
//!
//! A dependency is a tagged variant — by capability name, by interface id,
//! or by concrete type — mapped through an explicit registration table
//! populated at program init. Resolution queries the registry for a live
//! remote provider inside three quarters of the wall-clock budget, then
//! falls back to a locally registered factory, and caches successes for
//! five minutes.

use dashmap::DashMap;
use mesh_kernel::{AgentRegistration, MeshError, MeshResult};
use parking_lot::RwLock;
use serde_json::{Value, json};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::client::RegistryClient;
use crate::descriptor::DependencyDecl;
use crate::registry::CapabilityHandler;

/// Default total wall-clock budget for one resolution.
const DEFAULT_BUDGET: Duration = Duration::from_secs(30);

/// How long successful resolutions stay cached.
const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Identifies a dependency to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencySpec {
    /// A capability name as advertised in the registry.
    ByName(String),
    /// An abstract interface identifier.
    ByInterface(&'static str),
    /// A concrete type; the capability name derives from the type name.
    ByConcreteType { type_id: TypeId, type_name: &'static str },
}

impl DependencySpec {
    pub fn by_name(name: impl Into<String>) -> Self {
        DependencySpec::ByName(name.into())
    }

    pub fn by_interface(id: &'static str) -> Self {
        DependencySpec::ByInterface(id)
    }

    pub fn by_type<T: 'static>() -> Self {
        DependencySpec::ByConcreteType {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Capability name used for remote discovery.
    pub fn capability(&self) -> String {
        match self {
            DependencySpec::ByName(name) => name.clone(),
            DependencySpec::ByInterface(id) => id.to_string(),
            DependencySpec::ByConcreteType { type_name, .. } => {
                let bare = type_name.rsplit("::").next().unwrap_or(type_name);
                pascal_to_snake(bare)
            }
        }
    }

    /// Stable cache key.
    fn key(&self) -> String {
        match self {
            DependencySpec::ByName(name) => format!("name:{name}"),
            DependencySpec::ByInterface(id) => format!("iface:{id}"),
            DependencySpec::ByConcreteType { type_name, .. } => format!("type:{type_name}"),
        }
    }
}

/// `DateService` -> `date_service`.
fn pascal_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

type Factory = Arc<dyn Fn() -> MeshResult<Arc<dyn CapabilityHandler>> + Send + Sync>;

struct CachedResolution {
    handler: Arc<dyn CapabilityHandler>,
    inserted: Instant,
}

/// Resolves declared dependencies to live capability handlers.
pub struct DependencyResolver {
    client: Option<RegistryClient>,
    factories: RwLock<HashMap<String, Factory>>,
    cache: DashMap<String, CachedResolution>,
    budget: Duration,
    cache_ttl: Duration,
}

impl DependencyResolver {
    /// Resolver with remote discovery through the given client.
    pub fn new(client: RegistryClient) -> Self {
        Self {
            client: Some(client),
            factories: RwLock::new(HashMap::new()),
            cache: DashMap::new(),
            budget: DEFAULT_BUDGET,
            cache_ttl: CACHE_TTL,
        }
    }

    /// Local-only resolver; remote resolution is skipped entirely.
    pub fn local_only() -> Self {
        Self {
            client: None,
            factories: RwLock::new(HashMap::new()),
            cache: DashMap::new(),
            budget: DEFAULT_BUDGET,
            cache_ttl: CACHE_TTL,
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Register a local factory for a dependency. Called at program init;
    /// the factory runs only when remote resolution fails.
    pub fn register_local<F>(&self, spec: DependencySpec, factory: F)
    where
        F: Fn() -> MeshResult<Arc<dyn CapabilityHandler>> + Send + Sync + 'static,
    {
        self.factories.write().insert(spec.key(), Arc::new(factory));
    }

    /// Resolve a declared dependency.
    ///
    /// Returns `Ok(None)` only for optional dependencies with no provider.
    pub async fn resolve_decl(
        &self,
        decl: &DependencyDecl,
    ) -> MeshResult<Option<Arc<dyn CapabilityHandler>>> {
        self.resolve(&DependencySpec::by_name(decl.capability.clone()), decl.optional)
            .await
    }

    /// Resolve `spec`; `optional` turns a total miss into `Ok(None)`.
    pub async fn resolve(
        &self,
        spec: &DependencySpec,
        optional: bool,
    ) -> MeshResult<Option<Arc<dyn CapabilityHandler>>> {
        let key = spec.key();

        if let Some(entry) = self.cache.get(&key) {
            if entry.inserted.elapsed() < self.cache_ttl {
                debug!(dependency = %key, "resolved from cache");
                return Ok(Some(entry.handler.clone()));
            }
            drop(entry);
            self.cache.remove(&key);
        }

        let capability = spec.capability();

        // Remote first: three quarters of the budget.
        if let Some(client) = &self.client {
            let remote_budget = self.budget.mul_f64(0.75);
            match tokio::time::timeout(remote_budget, self.resolve_remote(client, &capability))
                .await
            {
                Ok(Ok(Some(handler))) => {
                    self.cache.insert(
                        key,
                        CachedResolution { handler: handler.clone(), inserted: Instant::now() },
                    );
                    return Ok(Some(handler));
                }
                Ok(Ok(None)) => {
                    debug!(capability, "no remote provider; trying local");
                }
                Ok(Err(err)) => {
                    warn!(capability, error = %err, "remote resolution failed; trying local");
                }
                Err(_) => {
                    warn!(capability, "remote resolution timed out; trying local");
                }
            }
        }

        // Local fallback.
        let factory = self.factories.read().get(&key).cloned();
        if let Some(factory) = factory {
            let handler = factory()?;
            self.cache.insert(
                key,
                CachedResolution { handler: handler.clone(), inserted: Instant::now() },
            );
            return Ok(Some(handler));
        }

        if optional {
            return Ok(None);
        }
        Err(MeshError::DependencyResolution {
            dependency: capability,
            reason: "no remote provider and no local factory".to_string(),
        })
    }

    async fn resolve_remote(
        &self,
        client: &RegistryClient,
        capability: &str,
    ) -> MeshResult<Option<Arc<dyn CapabilityHandler>>> {
        let agents = client
            .list_agents(&[("capability", capability), ("status", "healthy")])
            .await?;

        let Some(agent) = agents.iter().find(|a| endpoint_is_usable(&a.endpoint)) else {
            return Ok(None);
        };
        debug!(capability, agent_id = %agent.id, endpoint = %agent.endpoint, "resolved remote provider");
        Ok(Some(Arc::new(RemoteProxy::new(agent, capability)?)))
    }

    /// Drop all cached resolutions.
    pub fn invalidate(&self) {
        self.cache.clear();
    }
}

/// An endpoint we can actually call: HTTP with a real port. The registry
/// records `http://localhost:0/...` placeholders for stdio agents.
fn endpoint_is_usable(endpoint: &str) -> bool {
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return false;
    }
    !endpoint.contains(":0/") && !endpoint.ends_with(":0")
}

/// Proxy whose invocations traverse the transport to a remote agent.
pub struct RemoteProxy {
    http: reqwest::Client,
    endpoint: String,
    capability: String,
}

impl RemoteProxy {
    fn new(agent: &AgentRegistration, capability: &str) -> MeshResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MeshError::RegistryConnection(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: agent.endpoint.clone(),
            capability: capability.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl CapabilityHandler for RemoteProxy {
    async fn invoke(&self, params: Value) -> MeshResult<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": self.capability,
            "params": params,
        });
        let response = self
            .http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MeshError::RegistryConnection(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| MeshError::RegistryConnection(e.to_string()))?;
        if let Some(error) = body.get("error") {
            return Err(MeshError::DependencyResolution {
                dependency: self.capability.clone(),
                reason: error.to_string(),
            });
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_support::StaticHandler;

    #[test]
    fn type_names_become_snake_case_capabilities() {
        struct DateService;
        let spec = DependencySpec::by_type::<DateService>();
        assert_eq!(spec.capability(), "date_service");
    }

    #[test]
    fn placeholder_endpoints_are_not_usable() {
        assert!(!endpoint_is_usable("http://localhost:0/hello-world"));
        assert!(!endpoint_is_usable("stdio://hello"));
        assert!(endpoint_is_usable("http://10.0.0.5:9000/api"));
    }

    #[tokio::test]
    async fn local_fallback_resolves_registered_factory() {
        let resolver = DependencyResolver::local_only();
        resolver.register_local(DependencySpec::by_name("date_service"), || {
            Ok(Arc::new(StaticHandler(json!("2026-08-01"))) as Arc<dyn CapabilityHandler>)
        });

        let handler = resolver
            .resolve(&DependencySpec::by_name("date_service"), false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handler.invoke(json!({})).await.unwrap(), json!("2026-08-01"));
    }

    #[tokio::test]
    async fn optional_miss_resolves_to_none() {
        let resolver = DependencyResolver::local_only();
        let resolved = resolver
            .resolve(&DependencySpec::by_name("missing"), true)
            .await
            .unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn required_miss_is_an_error() {
        let resolver = DependencyResolver::local_only();
        let err = resolver
            .resolve(&DependencySpec::by_name("missing"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::DependencyResolution { .. }));
    }

    #[tokio::test]
    async fn successful_resolutions_are_cached() {
        let resolver = DependencyResolver::local_only();
        resolver.register_local(DependencySpec::by_name("svc"), || {
            Ok(Arc::new(StaticHandler(Value::Null)) as Arc<dyn CapabilityHandler>)
        });

        let first = resolver
            .resolve(&DependencySpec::by_name("svc"), false)
            .await
            .unwrap()
            .unwrap();
        let second = resolver
            .resolve(&DependencySpec::by_name("svc"), false)
            .await
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        resolver.invalidate();
        let third = resolver
            .resolve(&DependencySpec::by_name("svc"), false)
            .await
            .unwrap()
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }
}
