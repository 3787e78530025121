//! `meshctl stop` - stop one agent or the whole fleet.

use colored::Colorize;
use std::time::Duration;

use crate::commands::Context;
use crate::error::{CliError, CliResult};

pub async fn run(
    config_path: Option<std::path::PathBuf>,
    agent: Option<String>,
    force: bool,
    timeout: u64,
) -> CliResult<()> {
    let ctx = Context::load(config_path)?;
    // --force skips the graceful phase entirely.
    let timeout = if force { Duration::ZERO } else { Duration::from_secs(timeout) };

    if let Some(name) = agent {
        if ctx.orchestrator.tracker().get(&name).is_none() {
            return Err(CliError::NotFound(format!("agent {name}")));
        }
        if ctx.orchestrator.stop_agent(&name, timeout) {
            println!("{} Agent '{}' stopped", "✓".green(), name.cyan());
            return Ok(());
        }
        return Err(CliError::Termination(format!("agent {name} did not stop")));
    }

    let results = ctx.orchestrator.stop_all(timeout);
    let orphans = ctx.orchestrator.tracker().cleanup_orphaned();

    let stopped = results.values().filter(|ok| **ok).count();
    let failed = results.len() - stopped;
    println!("{} {stopped} stopped, {failed} had issues", if failed == 0 { "✓".green() } else { "!".yellow() });
    if !orphans.is_empty() {
        println!("  Reaped {} orphaned process(es)", orphans.len());
    }

    if failed > 0 {
        let names: Vec<&str> = results
            .iter()
            .filter(|(_, ok)| !**ok)
            .map(|(name, _)| name.as_str())
            .collect();
        return Err(CliError::Termination(names.join(", ")));
    }
    Ok(())
}
