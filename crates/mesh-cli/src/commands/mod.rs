//! CLI command implementations, one module per verb.

pub mod config_cmd;
pub mod list;
pub mod logs;
pub mod restart;
pub mod start;
pub mod status;
pub mod stop;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{CliConfig, ConfigManager};
use crate::error::CliResult;
use crate::orchestrator::LifecycleOrchestrator;
use crate::tracker::ProcessTracker;

/// Shared state built once per invocation.
pub struct Context {
    pub manager: ConfigManager,
    pub config: CliConfig,
    pub orchestrator: LifecycleOrchestrator,
}

impl Context {
    /// Load config (file + env), open the tracker, build the orchestrator.
    pub fn load(config_path: Option<PathBuf>) -> CliResult<Self> {
        Self::load_with(config_path, |_| {})
    }

    /// Same as [`load`](Self::load), applying CLI overrides before
    /// validation.
    pub fn load_with(
        config_path: Option<PathBuf>,
        apply_overrides: impl FnOnce(&mut CliConfig),
    ) -> CliResult<Self> {
        let manager = ConfigManager::new(config_path);
        let mut config = manager.load()?;
        apply_overrides(&mut config);
        config.validate()?;

        let tracker = Arc::new(ProcessTracker::load(None));
        let orchestrator = LifecycleOrchestrator::new(config.clone(), tracker);
        Ok(Self { manager, config, orchestrator })
    }
}
