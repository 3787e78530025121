//! `meshctl start` - bring up the registry and agents.

use colored::Colorize;
use std::time::Duration;

use crate::commands::Context;
use crate::error::{CliError, CliResult};
use crate::signals::ShutdownCoordinator;

pub struct StartArgs {
    pub agent_files: Vec<String>,
    pub registry_only: bool,
    pub background: bool,
    pub registry_host: Option<String>,
    pub registry_port: Option<u16>,
    pub db_path: Option<String>,
    pub log_level: Option<String>,
    pub debug: bool,
    pub startup_timeout: Option<u64>,
}

pub async fn run(config_path: Option<std::path::PathBuf>, args: StartArgs) -> CliResult<()> {
    let ctx = Context::load_with(config_path, |config| {
        if let Some(host) = &args.registry_host {
            config.registry_host = host.clone();
        }
        if let Some(port) = args.registry_port {
            config.registry_port = port;
        }
        if let Some(db_path) = &args.db_path {
            config.db_path = db_path.clone();
        }
        if let Some(level) = &args.log_level {
            config.log_level = level.clone();
        }
        if args.debug {
            config.debug_mode = true;
            config.log_level = "DEBUG".to_string();
        }
        if let Some(timeout) = args.startup_timeout {
            config.startup_timeout = timeout;
        }
    })?;

    let registry = ctx.orchestrator.ensure_registry_running().await?;
    println!(
        "{} Registry running at {} (PID {})",
        "✓".green(),
        ctx.config.registry_url().cyan(),
        registry.pid
    );

    let mut failures = 0usize;
    if !args.registry_only {
        for (file, result) in ctx.orchestrator.start_many(&args.agent_files).await {
            match result {
                Ok(record) => {
                    println!("{} Agent '{}' started (PID {})", "✓".green(), record.name.cyan(), record.pid);
                }
                Err(err) => {
                    failures += 1;
                    eprintln!("{} {}: {}", "✗".red(), file, err);
                }
            }
        }
    }

    if failures > 0 {
        return Err(CliError::Startup {
            name: format!("{failures} agent(s)"),
            exit_code: None,
            stderr: "see messages above".to_string(),
        });
    }

    if args.background {
        println!("Processes left running in the background; use 'meshctl stop' to stop them.");
        return Ok(());
    }

    // Foreground: stay up until a signal, then stop everything we started.
    let coordinator = ShutdownCoordinator::new(
        ctx.orchestrator.tracker(),
        Duration::from_secs(ctx.config.shutdown_timeout),
    );
    println!("Press Ctrl+C to stop.");
    coordinator.wait_for_signal().await;
    println!("Shutting down...");
    coordinator.shutdown().await;
    Err(CliError::Cancelled)
}
