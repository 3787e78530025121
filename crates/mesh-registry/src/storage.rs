//! In-memory registry state layered over the persistent store.
//!
//! [`RegistryStorage`] is the single mutation path of the registry: it
//! assigns resource versions, writes through to sqlite, maintains the
//! id/capability/namespace indexes, appends change events, fans them out to
//! watchers, and invalidates the response cache — all under one exclusive
//! hold so readers always observe a consistent snapshot and events leave in
//! version order.

use chrono::{DateTime, Utc};
use mesh_kernel::{
    AgentRegistration, AgentStatus, DiscoveryQuery, EventType, HealthConfiguration, HealthReport,
    RegistryEvent, RegistryMetrics,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::error::{RegistryError, RegistryResult};
use crate::store::RegistryStore;

/// Injectable time source; tests drive it to simulate heartbeat silence.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Queue depth per watcher; a watcher that falls this far behind is dropped.
const WATCHER_QUEUE_DEPTH: usize = 100;

/// Monotonic resource-version source.
///
/// Versions are the current wall clock in milliseconds, zero-padded to 20
/// digits so lexicographic order equals numeric order. Two writes landing in
/// the same millisecond get consecutive values: the second observes the
/// first and bumps by one.
pub struct VersionClock {
    last: Mutex<u64>,
}

impl VersionClock {
    pub fn new() -> Self {
        Self { last: Mutex::new(0) }
    }

    /// Issue the next version for the given instant.
    pub fn next(&self, now: DateTime<Utc>) -> String {
        let mut last = self.last.lock();
        let millis = now.timestamp_millis().max(0) as u64;
        let version = millis.max(*last + 1);
        *last = version;
        format!("{version:020}")
    }
}

impl Default for VersionClock {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Indexes {
    agents: HashMap<String, AgentRegistration>,
    capability_index: HashMap<String, BTreeSet<String>>,
    namespace_index: HashMap<String, BTreeSet<String>>,
    watchers: Vec<mpsc::Sender<RegistryEvent>>,
}

impl Indexes {
    fn index_agent(&mut self, agent: &AgentRegistration) {
        for cap in &agent.capabilities {
            self.capability_index
                .entry(cap.name.clone())
                .or_default()
                .insert(agent.id.clone());
        }
        self.namespace_index
            .entry(agent.namespace.clone())
            .or_default()
            .insert(agent.id.clone());
    }

    fn unindex_agent(&mut self, agent: &AgentRegistration) {
        for cap in &agent.capabilities {
            if let Some(ids) = self.capability_index.get_mut(&cap.name) {
                ids.remove(&agent.id);
                if ids.is_empty() {
                    self.capability_index.remove(&cap.name);
                }
            }
        }
        if let Some(ids) = self.namespace_index.get_mut(&agent.namespace) {
            ids.remove(&agent.id);
            if ids.is_empty() {
                self.namespace_index.remove(&agent.namespace);
            }
        }
    }

    /// Fan an event out to every watcher, dropping the ones that are full
    /// or gone rather than blocking the mutation path.
    fn notify(&mut self, event: RegistryEvent) {
        self.watchers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("dropping watcher: queue full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

/// The registry's combined durable + cached state.
pub struct RegistryStorage {
    store: RegistryStore,
    inner: RwLock<Indexes>,
    versions: VersionClock,
    cache: ResponseCache,
    clock: Clock,
    health_config: HealthConfiguration,
    /// When set, a failed durable write degrades to memory-only instead of
    /// surfacing; the caller opted into fallback mode.
    fallback_to_memory: bool,
    started_at: DateTime<Utc>,
    heartbeats_processed: AtomicU64,
    registrations_processed: AtomicU64,
}

impl RegistryStorage {
    pub fn new(store: RegistryStore) -> Self {
        Self::with_clock(store, Arc::new(Utc::now))
    }

    pub fn with_clock(store: RegistryStore, clock: Clock) -> Self {
        let started_at = clock();
        Self {
            store,
            inner: RwLock::new(Indexes::default()),
            versions: VersionClock::new(),
            cache: ResponseCache::default(),
            clock,
            health_config: HealthConfiguration::default(),
            fallback_to_memory: false,
            started_at,
            heartbeats_processed: AtomicU64::new(0),
            registrations_processed: AtomicU64::new(0),
        }
    }

    /// Opt into in-memory degradation when the store rejects a write.
    pub fn with_fallback_to_memory(mut self) -> Self {
        self.fallback_to_memory = true;
        self
    }

    /// Replace the health configuration (scan interval and thresholds).
    pub fn with_health_config(mut self, config: HealthConfiguration) -> Self {
        self.health_config = config;
        self
    }

    pub fn health_config(&self) -> &HealthConfiguration {
        &self.health_config
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    /// Rebuild the in-memory indexes from the persistent store.
    pub async fn initialize(&self) -> RegistryResult<()> {
        let agents = self.store.list_agents().await?;
        let mut inner = self.inner.write().await;
        for agent in agents {
            inner.index_agent(&agent);
            inner.agents.insert(agent.id.clone(), agent);
        }
        info!(agents = inner.agents.len(), "registry storage initialized");
        Ok(())
    }

    /// Subscribe to registry change events.
    pub async fn watch(&self) -> mpsc::Receiver<RegistryEvent> {
        let (tx, rx) = mpsc::channel(WATCHER_QUEUE_DEPTH);
        self.inner.write().await.watchers.push(tx);
        rx
    }

    /// Register or update an agent. Assigns thresholds from the agent type,
    /// stamps a fresh resource version, and emits `ADDED` or `MODIFIED`.
    pub async fn register_agent(
        &self,
        mut registration: AgentRegistration,
    ) -> RegistryResult<AgentRegistration> {
        validate_security_context(&registration)?;

        let thresholds = self.health_config.thresholds_for(&registration.agent_type);
        registration.timeout_threshold = thresholds.timeout_threshold;
        registration.eviction_threshold = thresholds.eviction_threshold;

        let now = self.now();
        let mut inner = self.inner.write().await;

        let existing = inner.agents.get(&registration.id).cloned();
        if let Some(prior) = &existing {
            registration.created_at = prior.created_at;
            if registration.last_heartbeat.is_none() {
                registration.last_heartbeat = prior.last_heartbeat;
            }
        }
        registration.updated_at = now;
        registration.resource_version = self.versions.next(now);

        if let Err(err) = self.store.register_agent(&registration).await {
            if self.fallback_to_memory {
                warn!(agent_id = %registration.id, error = %err, "store write failed; continuing in memory");
            } else {
                return Err(err);
            }
        }

        if let Some(prior) = &existing {
            inner.unindex_agent(prior);
        }
        inner.index_agent(&registration);
        inner
            .agents
            .insert(registration.id.clone(), registration.clone());

        let event_type = if existing.is_some() { EventType::Modified } else { EventType::Added };
        self.emit(&mut inner, event_type, &registration, now).await;
        self.cache.clear();

        if existing.is_none() {
            self.registrations_processed.fetch_add(1, Ordering::Relaxed);
        }
        debug!(agent_id = %registration.id, version = %registration.resource_version, "agent registered");
        Ok(registration)
    }

    /// Remove an agent and emit `DELETED`. Returns false when unknown.
    pub async fn unregister_agent(&self, agent_id: &str) -> RegistryResult<bool> {
        let now = self.now();
        let mut inner = self.inner.write().await;
        let Some(agent) = inner.agents.get(agent_id).cloned() else {
            return Ok(false);
        };

        if let Err(err) = self.store.unregister_agent(agent_id).await {
            if self.fallback_to_memory {
                warn!(agent_id, error = %err, "store delete failed; continuing in memory");
            } else {
                return Err(err);
            }
        }

        inner.unindex_agent(&agent);
        inner.agents.remove(agent_id);
        self.emit(&mut inner, EventType::Deleted, &agent, now).await;
        self.cache.clear();
        Ok(true)
    }

    pub async fn get_agent(&self, agent_id: &str) -> Option<AgentRegistration> {
        self.inner.read().await.agents.get(agent_id).cloned()
    }

    /// Agents passing the filter, sorted by id for stable output.
    pub async fn list_agents(&self, query: Option<&DiscoveryQuery>) -> Vec<AgentRegistration> {
        let inner = self.inner.read().await;
        let mut agents: Vec<AgentRegistration> = match query {
            Some(q) => inner.agents.values().filter(|a| q.matches(a)).cloned().collect(),
            None => inner.agents.values().cloned().collect(),
        };
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    /// Record a heartbeat: status becomes healthy, a new version is issued.
    pub async fn update_heartbeat(&self, agent_id: &str) -> RegistryResult<String> {
        let now = self.now();
        let mut inner = self.inner.write().await;
        if !inner.agents.contains_key(agent_id) {
            return Err(RegistryError::NotFound(format!("agent {agent_id}")));
        }

        let version = self.versions.next(now);
        if let Err(err) = self.store.update_heartbeat(agent_id, now, &version).await {
            if self.fallback_to_memory {
                warn!(agent_id, error = %err, "heartbeat write failed; continuing in memory");
            } else {
                return Err(err);
            }
        }

        let agent = inner
            .agents
            .get_mut(agent_id)
            .expect("presence checked above");
        agent.last_heartbeat = Some(now);
        agent.status = AgentStatus::Healthy;
        agent.updated_at = now;
        agent.resource_version = version.clone();
        let snapshot = agent.clone();

        self.emit(&mut inner, EventType::Modified, &snapshot, now).await;
        self.cache.clear();
        self.heartbeats_processed.fetch_add(1, Ordering::Relaxed);
        Ok(version)
    }

    /// Drain an agent: mark it `offline` so discovery stops handing it out,
    /// without terminating anything. A later heartbeat brings it back.
    pub async fn drain_agent(&self, agent_id: &str) -> RegistryResult<String> {
        let now = self.now();
        let mut inner = self.inner.write().await;
        if !inner.agents.contains_key(agent_id) {
            return Err(RegistryError::NotFound(format!("agent {agent_id}")));
        }

        let version = self.versions.next(now);
        let ids = [agent_id.to_string()];
        if let Err(err) = self
            .store
            .mark_agents_status(&ids, AgentStatus::Offline, now, &version)
            .await
        {
            if self.fallback_to_memory {
                warn!(agent_id, error = %err, "drain write failed; continuing in memory");
            } else {
                return Err(err);
            }
        }
        self.store
            .record_health_event(agent_id, AgentStatus::Offline, "drain", now)
            .await
            .ok();

        let agent = inner
            .agents
            .get_mut(agent_id)
            .expect("presence checked above");
        agent.status = AgentStatus::Offline;
        agent.updated_at = now;
        agent.resource_version = version.clone();
        let snapshot = agent.clone();

        self.emit(&mut inner, EventType::Modified, &snapshot, now).await;
        self.cache.clear();
        Ok(version)
    }

    /// Health report for one agent at the storage clock's current instant.
    pub async fn agent_health(&self, agent_id: &str) -> Option<HealthReport> {
        let inner = self.inner.read().await;
        inner
            .agents
            .get(agent_id)
            .map(|agent| HealthReport::for_agent(agent, self.now()))
    }

    /// One pass of the passive health scan: demote silent agents per the
    /// timeout/eviction thresholds. Returns ids newly marked expired.
    ///
    /// Recovery is not handled here; it happens solely through heartbeats.
    pub async fn check_health_and_evict(&self) -> RegistryResult<Vec<String>> {
        let now = self.now();
        let mut inner = self.inner.write().await;
        let mut evicted = Vec::new();

        let ids: Vec<String> = inner.agents.keys().cloned().collect();
        for id in ids {
            let agent = inner.agents.get(&id).expect("key from same map");
            let Some(delta) = agent.seconds_since_heartbeat(now) else {
                continue;
            };

            let next_status = if delta > agent.eviction_threshold as f64 {
                (agent.status != AgentStatus::Expired).then_some(AgentStatus::Expired)
            } else if delta > agent.timeout_threshold as f64 {
                (agent.status == AgentStatus::Healthy).then_some(AgentStatus::Degraded)
            } else {
                None
            };
            let Some(status) = next_status else { continue };

            let version = self.versions.next(now);
            if let Err(err) = self
                .store
                .mark_agents_status(std::slice::from_ref(&id), status, now, &version)
                .await
            {
                if self.fallback_to_memory {
                    warn!(agent_id = %id, error = %err, "health write failed; continuing in memory");
                } else {
                    return Err(err);
                }
            }
            self.store
                .record_health_event(&id, status, "timeout", now)
                .await
                .ok();

            let agent = inner.agents.get_mut(&id).expect("key from same map");
            agent.status = status;
            agent.updated_at = now;
            agent.resource_version = version;
            let snapshot = agent.clone();

            if status == AgentStatus::Expired {
                evicted.push(id.clone());
            }
            info!(agent_id = %id, status = %status, silence = delta, "health transition");
            self.emit(&mut inner, EventType::Modified, &snapshot, now).await;
        }

        if !evicted.is_empty() {
            self.cache.clear();
        }
        Ok(evicted)
    }

    /// Aggregate metrics computed from the in-memory snapshot.
    pub async fn metrics(&self) -> RegistryMetrics {
        let inner = self.inner.read().await;
        let now = self.now();

        let mut metrics = RegistryMetrics {
            total_agents: inner.agents.len(),
            uptime_seconds: (now - self.started_at).num_milliseconds() as f64 / 1000.0,
            heartbeats_processed: self.heartbeats_processed.load(Ordering::Relaxed),
            registrations_processed: self.registrations_processed.load(Ordering::Relaxed),
            last_updated: Some(now),
            ..Default::default()
        };

        let mut capability_names = BTreeSet::new();
        for agent in inner.agents.values() {
            match agent.status {
                AgentStatus::Healthy => metrics.healthy_agents += 1,
                AgentStatus::Degraded => metrics.degraded_agents += 1,
                AgentStatus::Expired => metrics.expired_agents += 1,
                AgentStatus::Offline => metrics.offline_agents += 1,
                AgentStatus::Pending => metrics.pending_agents += 1,
            }
            metrics.total_capabilities += agent.capabilities.len();
            for cap in &agent.capabilities {
                capability_names.insert(cap.name.clone());
            }
        }
        metrics.unique_capability_types = capability_names.len();
        metrics
    }

    /// Agent ids currently advertising the given capability name.
    pub async fn agents_with_capability(&self, capability: &str) -> BTreeSet<String> {
        self.inner
            .read()
            .await
            .capability_index
            .get(capability)
            .cloned()
            .unwrap_or_default()
    }

    async fn emit(
        &self,
        inner: &mut Indexes,
        event_type: EventType,
        agent: &AgentRegistration,
        now: DateTime<Utc>,
    ) {
        let event = RegistryEvent {
            event_type,
            agent_id: agent.id.clone(),
            resource_version: agent.resource_version.clone(),
            object: serde_json::to_value(agent).unwrap_or_default(),
            timestamp: now,
        };
        // The durable log is best-effort; the watch stream is authoritative
        // for ordering within this process.
        if let Err(err) = self.store.append_event(&event).await {
            warn!(agent_id = %agent.id, error = %err, "failed to persist registry event");
        }
        inner.notify(event);
    }
}

/// Registrations claiming `high_security` must carry the audit triad.
fn validate_security_context(registration: &AgentRegistration) -> RegistryResult<()> {
    if registration.security_context.as_deref() != Some("high_security") {
        return Ok(());
    }
    let required = ["authentication", "authorization", "audit"];
    let advertised = registration.capability_names();
    let missing: Vec<&str> = required
        .iter()
        .filter(|cap| !advertised.contains(**cap))
        .copied()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(RegistryError::SecurityValidation(format!(
            "high_security context requires capabilities: {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mesh_kernel::Capability;
    use parking_lot::RwLock as PLRwLock;

    fn sample_agent(id: &str, caps: &[&str]) -> AgentRegistration {
        let mut agent = AgentRegistration::new(id, id, format!("http://localhost:0/{id}"));
        agent.capabilities = caps.iter().map(|c| Capability::new(*c)).collect();
        agent
    }

    async fn storage() -> RegistryStorage {
        RegistryStorage::new(RegistryStore::open_in_memory().await.unwrap())
    }

    /// Clock handle tests can move forward.
    fn test_clock(start: DateTime<Utc>) -> (Clock, Arc<PLRwLock<DateTime<Utc>>>) {
        let now = Arc::new(PLRwLock::new(start));
        let handle = now.clone();
        let clock: Clock = Arc::new(move || *handle.read());
        (clock, now)
    }

    #[test]
    fn version_clock_is_strictly_monotonic() {
        let clock = VersionClock::new();
        let now = Utc::now();
        let a = clock.next(now);
        let b = clock.next(now);
        let c = clock.next(now);
        assert!(a < b && b < c);
        assert_eq!(a.len(), 20);
    }

    #[tokio::test]
    async fn register_assigns_version_and_thresholds() {
        let storage = storage().await;
        let registered = storage
            .register_agent(sample_agent("hello", &["greeting"]))
            .await
            .unwrap();
        assert!(!registered.resource_version.is_empty());
        assert_eq!(registered.timeout_threshold, 60);
        assert_eq!(registered.eviction_threshold, 120);
    }

    #[tokio::test]
    async fn reregistration_bumps_version_and_keeps_one_row() {
        let storage = storage().await;
        let first = storage
            .register_agent(sample_agent("hello", &["greeting"]))
            .await
            .unwrap();
        let second = storage
            .register_agent(sample_agent("hello", &["greeting"]))
            .await
            .unwrap();
        assert!(second.resource_version > first.resource_version);
        assert_eq!(storage.list_agents(None).await.len(), 1);
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn heartbeat_marks_healthy_and_errors_on_unknown() {
        let storage = storage().await;
        storage
            .register_agent(sample_agent("hello", &["greeting"]))
            .await
            .unwrap();

        let version = storage.update_heartbeat("hello").await.unwrap();
        assert!(!version.is_empty());
        let agent = storage.get_agent("hello").await.unwrap();
        assert_eq!(agent.status, AgentStatus::Healthy);

        let err = storage.update_heartbeat("ghost").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn capability_index_tracks_registrations() {
        let storage = storage().await;
        storage
            .register_agent(sample_agent("a", &["read_file"]))
            .await
            .unwrap();
        storage
            .register_agent(sample_agent("b", &["read_file", "write_file"]))
            .await
            .unwrap();

        let readers = storage.agents_with_capability("read_file").await;
        assert_eq!(readers.len(), 2);

        storage.unregister_agent("a").await.unwrap();
        let readers = storage.agents_with_capability("read_file").await;
        assert_eq!(readers.len(), 1);
        assert!(readers.contains("b"));
    }

    #[tokio::test]
    async fn high_security_requires_audit_triad() {
        let storage = storage().await;
        let mut agent = sample_agent("secure", &["authentication", "authorization"]);
        agent.security_context = Some("high_security".to_string());

        let err = storage.register_agent(agent).await.unwrap_err();
        assert!(matches!(err, RegistryError::SecurityValidation(_)));

        let mut agent = sample_agent(
            "secure",
            &["authentication", "authorization", "audit"],
        );
        agent.security_context = Some("high_security".to_string());
        assert!(storage.register_agent(agent).await.is_ok());
    }

    #[tokio::test]
    async fn watchers_receive_ordered_events() {
        let storage = storage().await;
        let mut rx = storage.watch().await;

        storage
            .register_agent(sample_agent("hello", &["greeting"]))
            .await
            .unwrap();
        storage.update_heartbeat("hello").await.unwrap();
        storage.unregister_agent("hello").await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        assert_eq!(first.event_type, EventType::Added);
        assert_eq!(second.event_type, EventType::Modified);
        assert_eq!(third.event_type, EventType::Deleted);
        assert!(first.resource_version < second.resource_version);
        assert!(second.resource_version < third.resource_version);
    }

    #[tokio::test]
    async fn simulated_clock_drives_eviction_boundaries() {
        let start = Utc::now();
        let (clock, now) = test_clock(start);
        let store = RegistryStore::open_in_memory().await.unwrap();
        let mut config = HealthConfiguration::default();
        config.default_thresholds =
            mesh_kernel::registration::HealthThresholds { timeout_threshold: 10, eviction_threshold: 30 };
        config.per_type.clear();
        let storage = RegistryStorage::with_clock(store, clock).with_health_config(config);

        storage
            .register_agent(sample_agent("hello", &["greeting"]))
            .await
            .unwrap();
        storage.update_heartbeat("hello").await.unwrap();

        // t = 9: still healthy.
        *now.write() = start + Duration::seconds(9);
        storage.check_health_and_evict().await.unwrap();
        assert_eq!(storage.get_agent("hello").await.unwrap().status, AgentStatus::Healthy);

        // t = 15: degraded.
        *now.write() = start + Duration::seconds(15);
        storage.check_health_and_evict().await.unwrap();
        assert_eq!(storage.get_agent("hello").await.unwrap().status, AgentStatus::Degraded);

        // t = 35: expired.
        *now.write() = start + Duration::seconds(35);
        let evicted = storage.check_health_and_evict().await.unwrap();
        assert_eq!(evicted, vec!["hello".to_string()]);
        assert_eq!(storage.get_agent("hello").await.unwrap().status, AgentStatus::Expired);

        // A heartbeat recovers the agent.
        storage.update_heartbeat("hello").await.unwrap();
        assert_eq!(storage.get_agent("hello").await.unwrap().status, AgentStatus::Healthy);
    }
}
