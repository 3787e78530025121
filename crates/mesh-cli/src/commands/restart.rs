//! `meshctl restart` and `meshctl restart-agent`.

use colored::Colorize;
use serde_json::Value;
use std::time::Duration;

use crate::commands::Context;
use crate::error::CliResult;

/// Full restart: stop everything, bring the registry back, respawn agents.
pub async fn run(
    config_path: Option<std::path::PathBuf>,
    timeout: u64,
    reset_config: bool,
) -> CliResult<()> {
    let ctx = Context::load(config_path.clone())?;
    if reset_config {
        ctx.manager.reset()?;
        println!("{} Configuration reset to defaults", "✓".green());
    }

    // Remember which agent files were running before we tear down.
    let agent_files: Vec<String> = ctx
        .orchestrator
        .tracker()
        .all()
        .values()
        .filter(|record| record.service_type == "agent")
        .filter_map(|record| record.metadata.get("agent_file").and_then(Value::as_str))
        .map(str::to_string)
        .collect();

    let results = ctx.orchestrator.stop_all(Duration::from_secs(timeout));
    let stopped = results.values().filter(|ok| **ok).count();
    println!("{} {stopped} process(es) stopped", "✓".green());

    // Reload so a --reset-config restart picks up the fresh file.
    let ctx = Context::load(config_path)?;
    let registry = ctx.orchestrator.ensure_registry_running().await?;
    println!(
        "{} Registry running at {} (PID {})",
        "✓".green(),
        ctx.config.registry_url().cyan(),
        registry.pid
    );

    for (file, result) in ctx.orchestrator.start_many(&agent_files).await {
        match result {
            Ok(record) => {
                println!("{} Agent '{}' restarted (PID {})", "✓".green(), record.name.cyan(), record.pid);
            }
            Err(err) => eprintln!("{} {}: {}", "✗".red(), file, err),
        }
    }
    Ok(())
}

/// Restart one agent; refuses when the registry is down, then waits for it
/// to re-register as healthy.
pub async fn run_agent(
    config_path: Option<std::path::PathBuf>,
    name: &str,
    timeout: u64,
) -> CliResult<()> {
    let ctx = Context::load(config_path)?;
    let record = ctx
        .orchestrator
        .restart_agent_with_registration_wait(name, Duration::from_secs(timeout))
        .await?;
    println!(
        "{} Agent '{}' restarted (PID {}) and registered healthy",
        "✓".green(),
        record.name.cyan(),
        record.pid
    );
    Ok(())
}
