//! Declarative descriptors for agents and their capabilities.
//!
//! The mesh has no decorator magic: an agent builds an [`AgentDescriptor`],
//! attaches one [`CapabilityDescriptor`] per exposed function, and hands the
//! result to the runtime. The builders exist so agent `main` functions stay
//! readable.

use mesh_kernel::{Capability, Stability};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// A dependency an agent declares on some other capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDecl {
    pub capability: String,
    /// Optional dependencies resolve to nothing instead of failing.
    pub optional: bool,
}

impl DependencyDecl {
    pub fn required(capability: impl Into<String>) -> Self {
        Self { capability: capability.into(), optional: false }
    }

    pub fn optional(capability: impl Into<String>) -> Self {
        Self { capability: capability.into(), optional: true }
    }
}

/// Declarative description of one capability an agent exposes.
#[derive(Debug, Clone)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub version: String,
    pub description: String,
    pub category: String,
    pub stability: Stability,
    pub tags: Vec<String>,
    /// Name of the handler function backing this capability.
    pub function_name: String,
    pub security_level: String,
    pub performance_metrics: BTreeMap<String, f64>,
    pub resource_requirements: BTreeMap<String, Value>,
    pub parameters_schema: Option<Value>,
}

impl CapabilityDescriptor {
    pub fn builder(name: impl Into<String>) -> CapabilityDescriptorBuilder {
        let name = name.into();
        CapabilityDescriptorBuilder {
            descriptor: CapabilityDescriptor {
                function_name: name.clone(),
                name,
                version: "1.0.0".to_string(),
                description: String::new(),
                category: String::new(),
                stability: Stability::default(),
                tags: Vec::new(),
                security_level: "standard".to_string(),
                performance_metrics: BTreeMap::new(),
                resource_requirements: BTreeMap::new(),
                parameters_schema: None,
            },
        }
    }

    /// Convert to the kernel capability carried in registration payloads.
    pub fn to_capability(&self) -> Capability {
        let mut capability = Capability::new(self.name.clone());
        capability.version = self.version.clone();
        capability.description = self.description.clone();
        capability.category = self.category.clone();
        capability.stability = self.stability;
        capability.tags = self.tags.iter().cloned().collect();
        capability.parameters_schema = self.parameters_schema.clone();
        capability.performance_metrics = self.performance_metrics.clone();
        capability.resource_requirements = self.resource_requirements.clone();
        capability
            .security_requirements
            .push(self.security_level.clone());
        capability
            .metadata
            .insert("function_name".to_string(), json!(self.function_name));
        capability
    }
}

/// Builder for [`CapabilityDescriptor`].
pub struct CapabilityDescriptorBuilder {
    descriptor: CapabilityDescriptor,
}

impl CapabilityDescriptorBuilder {
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.descriptor.version = version.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.descriptor.description = description.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.descriptor.category = category.into();
        self
    }

    pub fn stability(mut self, stability: Stability) -> Self {
        self.descriptor.stability = stability;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.descriptor.tags.push(tag.into());
        self
    }

    pub fn function_name(mut self, function_name: impl Into<String>) -> Self {
        self.descriptor.function_name = function_name.into();
        self
    }

    pub fn security_level(mut self, level: impl Into<String>) -> Self {
        self.descriptor.security_level = level.into();
        self
    }

    pub fn performance_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.descriptor.performance_metrics.insert(key.into(), value);
        self
    }

    pub fn resource_requirement(mut self, key: impl Into<String>, value: Value) -> Self {
        self.descriptor.resource_requirements.insert(key.into(), value);
        self
    }

    pub fn parameters_schema(mut self, schema: Value) -> Self {
        self.descriptor.parameters_schema = Some(schema);
        self
    }

    pub fn build(self) -> CapabilityDescriptor {
        self.descriptor
    }
}

/// Declarative description of the agent itself.
#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    /// Stable agent id; also the registered name before normalization.
    pub name: String,
    pub version: String,
    pub description: String,
    /// HTTP endpoint, when the agent listens on one. Stdio agents leave this
    /// unset and the registry records a placeholder.
    pub endpoint: Option<String>,
    pub namespace: String,
    pub agent_type: String,
    /// Heartbeat cadence in seconds.
    pub health_interval: u64,
    pub security_context: Option<String>,
    pub dependencies: Vec<DependencyDecl>,
    pub tags: BTreeMap<String, String>,
}

impl AgentDescriptor {
    pub fn builder(name: impl Into<String>) -> AgentDescriptorBuilder {
        AgentDescriptorBuilder {
            descriptor: AgentDescriptor {
                name: name.into(),
                version: "1.0.0".to_string(),
                description: String::new(),
                endpoint: None,
                namespace: "default".to_string(),
                agent_type: "mesh-agent".to_string(),
                health_interval: 30,
                security_context: None,
                dependencies: Vec::new(),
                tags: BTreeMap::new(),
            },
        }
    }

    /// Registration metadata payload for `register_with_metadata`.
    pub fn to_metadata(&self, capabilities: &[CapabilityDescriptor]) -> Value {
        let capabilities: Vec<Value> = capabilities
            .iter()
            .map(|cap| serde_json::to_value(cap.to_capability()).unwrap_or_default())
            .collect();
        json!({
            "name": self.name,
            "version": self.version,
            "description": self.description,
            "endpoint": self.endpoint,
            "namespace": self.namespace,
            "agent_type": self.agent_type,
            "health_interval": self.health_interval,
            "security_context": self.security_context,
            "dependencies": self
                .dependencies
                .iter()
                .map(|d| d.capability.clone())
                .collect::<Vec<_>>(),
            "tags": self.tags,
            "capabilities": capabilities,
        })
    }
}

/// Builder for [`AgentDescriptor`].
pub struct AgentDescriptorBuilder {
    descriptor: AgentDescriptor,
}

impl AgentDescriptorBuilder {
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.descriptor.version = version.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.descriptor.description = description.into();
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.descriptor.endpoint = Some(endpoint.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.descriptor.namespace = namespace.into();
        self
    }

    pub fn agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.descriptor.agent_type = agent_type.into();
        self
    }

    pub fn health_interval(mut self, seconds: u64) -> Self {
        self.descriptor.health_interval = seconds;
        self
    }

    pub fn security_context(mut self, context: impl Into<String>) -> Self {
        self.descriptor.security_context = Some(context.into());
        self
    }

    pub fn depends_on(mut self, capability: impl Into<String>) -> Self {
        self.descriptor
            .dependencies
            .push(DependencyDecl::required(capability));
        self
    }

    pub fn depends_on_optional(mut self, capability: impl Into<String>) -> Self {
        self.descriptor
            .dependencies
            .push(DependencyDecl::optional(capability));
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor.tags.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> AgentDescriptor {
        self.descriptor
    }
}
