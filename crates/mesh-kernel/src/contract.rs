//! Service contracts: richer per-agent method descriptions.
//!
//! A contract is optional metadata an agent may publish alongside its
//! registration. It names a service, its versions, and the methods it
//! exposes with structured signatures. The registry persists contracts in a
//! second-tier schema keyed by `(agent_id, service_name)`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How strictly contract versions must line up for a consumer to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompatibilityLevel {
    #[default]
    Strict,
    Backward,
    Forward,
}

/// Kind of callable a contract method maps to in the source service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MethodType {
    #[default]
    Function,
    Instance,
    Class,
    Static,
    AsyncFunction,
    AsyncMethod,
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MethodType::Function => "function",
            MethodType::Instance => "instance",
            MethodType::Class => "class",
            MethodType::Static => "static",
            MethodType::AsyncFunction => "async_function",
            MethodType::AsyncMethod => "async_method",
        };
        f.write_str(s)
    }
}

/// One parameter of a contract method signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodParameter {
    pub name: String,
    /// Type tag as declared by the source service (free text, e.g. "str").
    pub type_tag: String,
    /// Parameter kind (positional, keyword, variadic, ...).
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(default)]
    pub is_optional: bool,
    pub position: u32,
}

fn default_service_version() -> String {
    "1.0.0".to_string()
}

fn default_stability_level() -> String {
    "stable".to_string()
}

fn default_complexity() -> String {
    "O(1)".to_string()
}

fn default_timeout_hint() -> u64 {
    30
}

/// Structured description of a single contract method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodMetadata {
    pub method_name: String,
    #[serde(default)]
    pub parameters: Vec<MethodParameter>,
    #[serde(default)]
    pub return_type: String,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub method_type: MethodType,
    #[serde(default)]
    pub docstring: String,
    #[serde(default = "default_stability_level")]
    pub stability_level: String,
    #[serde(default)]
    pub deprecation_warning: String,
    /// Expected algorithmic complexity, free text.
    #[serde(default = "default_complexity")]
    pub expected_complexity: String,
    /// Suggested invocation timeout in seconds.
    #[serde(default = "default_timeout_hint")]
    pub timeout_hint: u64,
    #[serde(default)]
    pub resource_requirements: BTreeMap<String, serde_json::Value>,
    /// Capability names this method contributes to.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl MethodMetadata {
    pub fn new(method_name: impl Into<String>) -> Self {
        Self {
            method_name: method_name.into(),
            parameters: Vec::new(),
            return_type: String::new(),
            is_async: false,
            method_type: MethodType::default(),
            docstring: String::new(),
            stability_level: default_stability_level(),
            deprecation_warning: String::new(),
            expected_complexity: default_complexity(),
            timeout_hint: default_timeout_hint(),
            resource_requirements: BTreeMap::new(),
            capabilities: Vec::new(),
        }
    }
}

/// Optional richer description of an agent's service surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceContract {
    pub service_name: String,
    #[serde(default = "default_service_version")]
    pub service_version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_service_version")]
    pub contract_version: String,
    #[serde(default)]
    pub compatibility_level: CompatibilityLevel,
    #[serde(default)]
    pub methods: Vec<MethodMetadata>,
}

impl ServiceContract {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: default_service_version(),
            description: String::new(),
            contract_version: default_service_version(),
            compatibility_level: CompatibilityLevel::default(),
            methods: Vec::new(),
        }
    }

    /// All capability names contributed by this contract's methods.
    pub fn capability_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .methods
            .iter()
            .flat_map(|m| m.capabilities.iter().map(|c| c.as_str()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_type_serializes_snake_case() {
        let json = serde_json::to_string(&MethodType::AsyncFunction).unwrap();
        assert_eq!(json, "\"async_function\"");
    }

    #[test]
    fn contract_collects_capability_names() {
        let mut contract = ServiceContract::new("file-service");
        let mut read = MethodMetadata::new("read_file");
        read.capabilities = vec!["read_file".into(), "file_io".into()];
        let mut write = MethodMetadata::new("write_file");
        write.capabilities = vec!["write_file".into(), "file_io".into()];
        contract.methods = vec![read, write];

        assert_eq!(contract.capability_names(), vec!["file_io", "read_file", "write_file"]);
    }

    #[test]
    fn contract_deserializes_with_defaults() {
        let raw = serde_json::json!({
            "service_name": "greeter",
            "methods": [{"method_name": "greet"}],
        });
        let contract: ServiceContract = serde_json::from_value(raw).unwrap();
        assert_eq!(contract.contract_version, "1.0.0");
        assert_eq!(contract.compatibility_level, CompatibilityLevel::Strict);
        assert_eq!(contract.methods[0].timeout_hint, 30);
        assert_eq!(contract.methods[0].expected_complexity, "O(1)");
    }
}
