//! meshctl binary: command dispatch and exit-code mapping.

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use mesh_cli::cli::{Cli, Commands};
use mesh_cli::commands;
use mesh_cli::commands::start::StartArgs;
use mesh_cli::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone();
    let result = match cli.command {
        Commands::Start {
            agent_files,
            registry_only,
            background,
            registry_host,
            registry_port,
            db_path,
            log_level,
            debug,
            startup_timeout,
        } => {
            commands::start::run(
                config_path,
                StartArgs {
                    agent_files,
                    registry_only,
                    background,
                    registry_host,
                    registry_port,
                    db_path,
                    log_level,
                    debug,
                    startup_timeout,
                },
            )
            .await
        }
        Commands::Stop { agent, force, timeout } => {
            commands::stop::run(config_path, agent, force, timeout).await
        }
        Commands::Restart { timeout, reset_config } => {
            commands::restart::run(config_path, timeout, reset_config).await
        }
        Commands::RestartAgent { name, timeout } => {
            commands::restart::run_agent(config_path, &name, timeout).await
        }
        Commands::Status { json, verbose } => {
            commands::status::run(config_path, json, verbose || cli.verbose).await
        }
        Commands::List { agents, services, filter, json } => {
            commands::list::run(config_path, agents, services, filter, json).await
        }
        Commands::Logs { agent, follow, level, lines } => {
            commands::logs::run(agent, follow, level, lines).await
        }
        Commands::Config { action } => commands::config_cmd::run(config_path, action),
    };

    match result {
        Ok(()) => {}
        Err(CliError::Cancelled) => {
            // Interruption is not an error worth a stack of messages.
            eprintln!("Interrupted");
            std::process::exit(130);
        }
        Err(err) => {
            eprintln!("{} {err}", "error:".red());
            std::process::exit(err.exit_code());
        }
    }
}
