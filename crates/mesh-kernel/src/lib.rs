//! Shared kernel for the MCP Mesh control plane.
//!
//! Every crate in the workspace speaks the types defined here: agent
//! registrations and their capabilities, service contracts, discovery
//! queries, and the common error vocabulary. The registry persists these
//! types, the runtime serializes them onto the wire, and the CLI renders
//! them — so this crate owns the wire format.

pub mod contract;
pub mod error;
pub mod naming;
pub mod query;
pub mod registration;
pub mod version;

pub use contract::{CompatibilityLevel, MethodMetadata, MethodParameter, MethodType, ServiceContract};
pub use error::{MeshError, MeshResult};
pub use naming::normalize_name;
pub use query::{fuzzy_match, CapabilityQuery, DiscoveryQuery};
pub use registration::{
    AgentRegistration, AgentStatus, Capability, EventType, HealthConfiguration, HealthReport,
    RegistryEvent, RegistryMetrics, Stability,
};
pub use version::VersionConstraint;
