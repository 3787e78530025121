//! Agent registration model.
//!
//! [`AgentRegistration`] is the central entity of the mesh: the registry
//! stores it, agents produce it at startup, and discovery queries filter
//! over it. The shape mirrors the registry's `agents` table and the JSON
//! payloads exchanged over `/agents/register_with_metadata`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a registered agent.
///
/// Transitions are driven by heartbeats (anything → `Healthy`) and by the
/// registry's passive health monitor (`Healthy` → `Degraded` → `Expired`).
/// `Expired` requires re-registration or a fresh heartbeat to recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Registered but no heartbeat received yet.
    #[default]
    Pending,
    Healthy,
    Degraded,
    Expired,
    Offline,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Pending => "pending",
            AgentStatus::Healthy => "healthy",
            AgentStatus::Degraded => "degraded",
            AgentStatus::Expired => "expired",
            AgentStatus::Offline => "offline",
        };
        f.write_str(s)
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AgentStatus::Pending),
            "healthy" => Ok(AgentStatus::Healthy),
            "degraded" => Ok(AgentStatus::Degraded),
            "expired" => Ok(AgentStatus::Expired),
            "offline" => Ok(AgentStatus::Offline),
            other => Err(format!("unknown agent status: {other}")),
        }
    }
}

/// Stability level advertised for a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    Experimental,
    Beta,
    #[default]
    Stable,
    Deprecated,
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stability::Experimental => "experimental",
            Stability::Beta => "beta",
            Stability::Stable => "stable",
            Stability::Deprecated => "deprecated",
        };
        f.write_str(s)
    }
}

/// A named, versioned unit of functionality an agent advertises.
///
/// Identified by `(agent_id, name)`; the registry keeps a capability →
/// agent-set index derived from these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default = "default_capability_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub stability: Stability,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Optional JSON schema describing invocation parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub security_requirements: Vec<String>,
    /// Free-form numeric metrics (latency percentiles, throughput, ...).
    #[serde(default)]
    pub performance_metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub resource_requirements: BTreeMap<String, serde_json::Value>,
    /// Opaque extension data; the runtime records `function_name` here.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

fn default_capability_version() -> String {
    "1.0.0".to_string()
}

impl Capability {
    /// Create a capability with the given name and defaults everywhere else.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: default_capability_version(),
            description: String::new(),
            category: String::new(),
            stability: Stability::default(),
            tags: BTreeSet::new(),
            parameters_schema: None,
            security_requirements: Vec::new(),
            performance_metrics: BTreeMap::new(),
            resource_requirements: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_health_interval() -> u64 {
    30
}

fn default_timeout_threshold() -> u64 {
    60
}

fn default_eviction_threshold() -> u64 {
    120
}

fn default_agent_type() -> String {
    "mesh-agent".to_string()
}

/// A registered agent: identity, endpoint, capabilities, and health state.
///
/// `(name, namespace)` is unique within the registry. `resource_version` is
/// a zero-padded millisecond stamp assigned by the registry on every
/// mutation; a newer revision always compares lexicographically greater.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub id: String,
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub endpoint: String,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub resource_version: String,
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Heartbeat cadence the agent promises, in seconds. Accepted but not
    /// trusted to bound monitor behavior.
    #[serde(default = "default_health_interval")]
    pub health_interval: u64,
    /// Seconds of heartbeat silence before the agent is marked degraded.
    #[serde(default = "default_timeout_threshold")]
    pub timeout_threshold: u64,
    /// Seconds of heartbeat silence before the agent is marked expired.
    #[serde(default = "default_eviction_threshold")]
    pub eviction_threshold: u64,
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
    /// Opaque agent configuration carried through registration.
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<String>,
    /// Capability names this agent depends on, in declaration order.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

impl AgentRegistration {
    /// Create a minimal registration in `pending` state.
    pub fn new(id: impl Into<String>, name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            namespace: default_namespace(),
            endpoint: endpoint.into(),
            status: AgentStatus::Pending,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            resource_version: String::new(),
            last_heartbeat: None,
            health_interval: default_health_interval(),
            timeout_threshold: default_timeout_threshold(),
            eviction_threshold: default_eviction_threshold(),
            agent_type: default_agent_type(),
            config: BTreeMap::new(),
            security_context: None,
            dependencies: Vec::new(),
            capabilities: Vec::new(),
        }
    }

    /// Names of all advertised capabilities.
    pub fn capability_names(&self) -> BTreeSet<&str> {
        self.capabilities.iter().map(|c| c.name.as_str()).collect()
    }

    /// Seconds since the last heartbeat, if any was ever received.
    pub fn seconds_since_heartbeat(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_heartbeat
            .map(|hb| (now - hb).num_milliseconds() as f64 / 1000.0)
    }
}

/// Registry change event kind, Kubernetes watch style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Added => "ADDED",
            EventType::Modified => "MODIFIED",
            EventType::Deleted => "DELETED",
        };
        f.write_str(s)
    }
}

/// One entry of the append-only registry change log, fanned out to watchers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub agent_id: String,
    pub resource_version: String,
    /// Serialized snapshot of the agent at event time.
    pub object: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Timeout/eviction thresholds for one agent type, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthThresholds {
    pub timeout_threshold: u64,
    pub eviction_threshold: u64,
}

/// Health-monitor configuration: scan cadence plus per-agent-type thresholds.
///
/// Thresholds are applied at registration time from the agent's declared
/// `agent_type`; unknown types get the safe default of 60 s / 120 s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfiguration {
    /// Scan interval of the health monitor, in seconds.
    pub check_interval: u64,
    pub default_thresholds: HealthThresholds,
    pub per_type: HashMap<String, HealthThresholds>,
}

impl Default for HealthConfiguration {
    fn default() -> Self {
        let mut per_type = HashMap::new();
        per_type.insert(
            "mesh-agent".to_string(),
            HealthThresholds { timeout_threshold: 60, eviction_threshold: 120 },
        );
        per_type.insert(
            "mcp-agent".to_string(),
            HealthThresholds { timeout_threshold: 60, eviction_threshold: 120 },
        );
        // The registry itself heartbeats rarely; give it more slack.
        per_type.insert(
            "registry".to_string(),
            HealthThresholds { timeout_threshold: 120, eviction_threshold: 300 },
        );
        Self {
            check_interval: 30,
            default_thresholds: HealthThresholds { timeout_threshold: 60, eviction_threshold: 120 },
            per_type,
        }
    }
}

impl HealthConfiguration {
    /// Thresholds for the given agent type, falling back to the default.
    pub fn thresholds_for(&self, agent_type: &str) -> HealthThresholds {
        self.per_type
            .get(agent_type)
            .copied()
            .unwrap_or(self.default_thresholds)
    }
}

/// Per-agent health report returned by `GET /health/{agent_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub agent_id: String,
    pub status: AgentStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub next_heartbeat_expected: Option<DateTime<Utc>>,
    pub time_since_heartbeat: Option<f64>,
    pub timeout_threshold: u64,
    pub eviction_threshold: u64,
    pub is_expired: bool,
    pub message: String,
}

impl HealthReport {
    /// Derive the report for an agent at the given instant.
    pub fn for_agent(agent: &AgentRegistration, now: DateTime<Utc>) -> Self {
        let time_since = agent.seconds_since_heartbeat(now);
        let next_expected = agent
            .last_heartbeat
            .map(|hb| hb + Duration::seconds(agent.health_interval as i64));

        let (is_expired, message) = match time_since {
            Some(delta) if delta > agent.eviction_threshold as f64 => {
                (true, format!("Agent expired - no heartbeat for {delta:.1}s"))
            }
            Some(delta) if delta > agent.timeout_threshold as f64 => {
                (false, format!("Agent degraded - no heartbeat for {delta:.1}s"))
            }
            Some(delta) => (false, format!("Agent healthy - last heartbeat {delta:.1}s ago")),
            None => (false, "No heartbeat received yet".to_string()),
        };

        Self {
            agent_id: agent.id.clone(),
            status: agent.status,
            last_heartbeat: agent.last_heartbeat,
            next_heartbeat_expected: next_expected,
            time_since_heartbeat: time_since,
            timeout_threshold: agent.timeout_threshold,
            eviction_threshold: agent.eviction_threshold,
            is_expired,
            message,
        }
    }
}

/// Aggregate registry statistics returned by `GET /metrics`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryMetrics {
    pub total_agents: usize,
    pub healthy_agents: usize,
    pub degraded_agents: usize,
    pub expired_agents: usize,
    pub offline_agents: usize,
    pub pending_agents: usize,
    pub total_capabilities: usize,
    pub unique_capability_types: usize,
    pub uptime_seconds: f64,
    pub heartbeats_processed: u64,
    pub registrations_processed: u64,
    pub last_updated: Option<DateTime<Utc>>,
}
