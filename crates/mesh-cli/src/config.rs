//! CLI configuration with layered sources.
//!
//! Values come from, in order of increasing precedence: built-in defaults,
//! the config file (`~/.mcp_mesh/cli_config.json`), `MCP_MESH_*` environment
//! variables, and command-line arguments.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CliError, CliResult};

const VALID_LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

/// Flat CLI configuration object; serialized as-is to the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub registry_host: String,
    pub registry_port: u16,
    pub db_path: String,
    pub log_level: String,
    pub health_check_interval: u64,
    pub auto_restart: bool,
    pub watch_files: bool,
    pub debug_mode: bool,
    pub startup_timeout: u64,
    pub shutdown_timeout: u64,
    pub enable_background: bool,
    pub pid_file: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            registry_host: "localhost".to_string(),
            registry_port: 8000,
            db_path: "./mcp_mesh_registry.db".to_string(),
            log_level: "INFO".to_string(),
            health_check_interval: 30,
            auto_restart: true,
            watch_files: true,
            debug_mode: false,
            startup_timeout: 30,
            shutdown_timeout: 30,
            enable_background: false,
            pid_file: "./mcp_mesh_dev.pid".to_string(),
        }
    }
}

impl CliConfig {
    /// Registry base URL derived from host and port.
    pub fn registry_url(&self) -> String {
        format!("http://{}:{}", self.registry_host, self.registry_port)
    }

    /// Validate ranges and enumerations.
    pub fn validate(&self) -> CliResult<()> {
        let mut errors = Vec::new();

        if self.registry_port == 0 {
            errors.push("registry_port must be between 1 and 65535".to_string());
        }
        if self.registry_host.is_empty() {
            errors.push("registry_host must be a non-empty string".to_string());
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.to_uppercase().as_str()) {
            errors.push(format!(
                "invalid log_level '{}': expected one of {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            ));
        }
        if self.health_check_interval == 0 {
            errors.push("health_check_interval must be positive".to_string());
        }
        if self.startup_timeout == 0 {
            errors.push("startup_timeout must be positive".to_string());
        }
        if self.shutdown_timeout == 0 {
            errors.push("shutdown_timeout must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CliError::Config(errors.join("; ")))
        }
    }

    /// Apply environment overrides (`MCP_MESH_*`).
    fn apply_env(&mut self) {
        use mesh_runtime::env::parse_bool;

        let mut set_string = |key: &str, target: &mut String| {
            if let Ok(value) = std::env::var(key) {
                *target = value;
            }
        };
        set_string("MCP_MESH_REGISTRY_HOST", &mut self.registry_host);
        set_string("MCP_MESH_DB_PATH", &mut self.db_path);
        set_string("MCP_MESH_LOG_LEVEL", &mut self.log_level);
        set_string("MCP_MESH_PID_FILE", &mut self.pid_file);

        if let Ok(raw) = std::env::var("MCP_MESH_REGISTRY_PORT") {
            if let Ok(port) = raw.parse() {
                self.registry_port = port;
            }
        }
        for (key, target) in [
            ("MCP_MESH_HEALTH_CHECK_INTERVAL", &mut self.health_check_interval),
            ("MCP_MESH_STARTUP_TIMEOUT", &mut self.startup_timeout),
            ("MCP_MESH_SHUTDOWN_TIMEOUT", &mut self.shutdown_timeout),
        ] {
            if let Ok(raw) = std::env::var(key) {
                if let Ok(value) = raw.parse() {
                    *target = value;
                }
            }
        }
        for (key, target) in [
            ("MCP_MESH_AUTO_RESTART", &mut self.auto_restart),
            ("MCP_MESH_WATCH_FILES", &mut self.watch_files),
            ("MCP_MESH_DEBUG_MODE", &mut self.debug_mode),
            ("MCP_MESH_ENABLE_BACKGROUND", &mut self.enable_background),
        ] {
            if let Ok(raw) = std::env::var(key) {
                *target = parse_bool(&raw);
            }
        }
    }
}

/// Default location of the config file.
pub fn default_config_path() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcp_mesh")
        .join("cli_config.json")
}

/// Loads, saves, and layers [`CliConfig`] values.
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path: path.unwrap_or_else(default_config_path) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Defaults, overlaid by the file (if present), then the environment.
    /// CLI argument overrides are applied by the caller afterwards.
    pub fn load(&self) -> CliResult<CliConfig> {
        let mut config = match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| CliError::Config(format!("invalid config file: {e}")))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => CliConfig::default(),
            Err(err) => return Err(err.into()),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &CliConfig) -> CliResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    /// Write defaults back to the file and return them.
    pub fn reset(&self) -> CliResult<CliConfig> {
        let config = CliConfig::default();
        self.save(&config)?;
        Ok(config)
    }

    /// Set a single key by name; value parsing depends on the field type.
    pub fn set(&self, key: &str, value: &str) -> CliResult<CliConfig> {
        let mut config = self.load()?;
        let parse_u64 = |value: &str| {
            value
                .parse::<u64>()
                .map_err(|_| CliError::Config(format!("expected a number, got '{value}'")))
        };
        match key {
            "registry_host" => config.registry_host = value.to_string(),
            "registry_port" => {
                config.registry_port = value
                    .parse()
                    .map_err(|_| CliError::Config(format!("invalid port: {value}")))?;
            }
            "db_path" => config.db_path = value.to_string(),
            "log_level" => config.log_level = value.to_string(),
            "health_check_interval" => config.health_check_interval = parse_u64(value)?,
            "startup_timeout" => config.startup_timeout = parse_u64(value)?,
            "shutdown_timeout" => config.shutdown_timeout = parse_u64(value)?,
            "auto_restart" => config.auto_restart = mesh_runtime::env::parse_bool(value),
            "watch_files" => config.watch_files = mesh_runtime::env::parse_bool(value),
            "debug_mode" => config.debug_mode = mesh_runtime::env::parse_bool(value),
            "enable_background" => config.enable_background = mesh_runtime::env::parse_bool(value),
            "pid_file" => config.pid_file = value.to_string(),
            other => return Err(CliError::Config(format!("unknown config key: {other}"))),
        }
        config.validate()?;
        self.save(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> ConfigManager {
        ConfigManager::new(Some(dir.path().join("cli_config.json")))
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = manager(&dir).load().unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let mut config = CliConfig::default();
        config.registry_port = 9001;
        mgr.save(&config).unwrap();
        assert_eq!(mgr.load().unwrap().registry_port, 9001);
    }

    #[test]
    fn set_updates_single_key() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let config = mgr.set("registry_port", "9999").unwrap();
        assert_eq!(config.registry_port, 9999);
        assert_eq!(mgr.load().unwrap().registry_port, 9999);

        assert!(mgr.set("registry_port", "banana").is_err());
        assert!(mgr.set("no_such_key", "1").is_err());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = CliConfig::default();
        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = CliConfig::default();
        config.registry_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn reset_restores_defaults() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        mgr.set("registry_host", "elsewhere").unwrap();
        let config = mgr.reset().unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn registry_url_combines_host_and_port() {
        let config = CliConfig::default();
        assert_eq!(config.registry_url(), "http://localhost:8000");
    }
}
