//! Environment variables injected into spawned agents by the controller.

use std::env;

/// Default registry endpoint when nothing is configured.
pub const DEFAULT_REGISTRY_URL: &str = "http://localhost:8000";

/// Typed view of the `MCP_MESH_*` environment.
#[derive(Debug, Clone)]
pub struct MeshEnv {
    pub registry_url: String,
    pub registry_host: Option<String>,
    pub registry_port: Option<u16>,
    /// Opaque to agents; carried through for diagnostics only.
    pub database_url: Option<String>,
    pub debug: bool,
    pub log_level: Option<String>,
    /// Whether the runtime should flush declarations on startup.
    pub auto_process: bool,
    /// Whether handlers get the dependency-injection hook attached.
    pub auto_enhance: bool,
}

impl MeshEnv {
    /// Snapshot the process environment.
    pub fn from_env() -> Self {
        Self {
            registry_url: env::var("MCP_MESH_REGISTRY_URL")
                .unwrap_or_else(|_| DEFAULT_REGISTRY_URL.to_string()),
            registry_host: env::var("MCP_MESH_REGISTRY_HOST").ok(),
            registry_port: env::var("MCP_MESH_REGISTRY_PORT")
                .ok()
                .and_then(|raw| raw.parse().ok()),
            database_url: env::var("MCP_MESH_DATABASE_URL").ok(),
            debug: env::var("MCP_MESH_DEBUG")
                .map(|raw| parse_bool(&raw))
                .unwrap_or(false),
            log_level: env::var("MCP_MESH_LOG_LEVEL").ok(),
            auto_process: env::var("MCP_MESH_AUTO_PROCESS")
                .map(|raw| parse_bool(&raw))
                .unwrap_or(true),
            auto_enhance: env::var("MCP_MESH_AUTO_ENHANCE")
                .map(|raw| parse_bool(&raw))
                .unwrap_or(true),
        }
    }
}

impl Default for MeshEnv {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            registry_host: None,
            registry_port: None,
            database_url: None,
            debug: false,
            log_level: None,
            auto_process: true,
            auto_enhance: true,
        }
    }
}

/// Boolean environment convention: `true|1|yes|on` (case-insensitive).
pub fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        for raw in ["true", "TRUE", "1", "yes", "on", " On "] {
            assert!(parse_bool(raw), "{raw} should parse true");
        }
    }

    #[test]
    fn falsy_values() {
        for raw in ["false", "0", "no", "off", "", "banana"] {
            assert!(!parse_bool(raw), "{raw} should parse false");
        }
    }
}
