//! `meshctl status` - tracked processes and registry state.

use colored::Colorize;
use serde_json::json;

use crate::commands::Context;
use crate::error::CliResult;
use crate::output;
use crate::process_tree::is_alive;

pub async fn run(
    config_path: Option<std::path::PathBuf>,
    json_output: bool,
    verbose: bool,
) -> CliResult<()> {
    let ctx = Context::load(config_path)?;
    let tracker = ctx.orchestrator.tracker();
    tracker.cleanup_dead();

    let processes = tracker.all();
    let registry_state = tracker.registry_state();

    if json_output {
        let mut agents = json!(null);
        if verbose {
            if let Ok(client) = ctx.orchestrator.registry_client() {
                if let Ok(list) = client.list_agents(&[]).await {
                    agents = json!(list);
                }
            }
        }
        println!(
            "{}",
            output::json_ok(json!({
                "processes": processes,
                "registry_state": registry_state,
                "registry_agents": agents,
            }))
        );
        return Ok(());
    }

    match &registry_state {
        Some(state) => println!("Registry: {} (db: {})", state.url.cyan(), state.database_path),
        None => println!("Registry: {}", "not running".red()),
    }

    if processes.is_empty() {
        println!("No tracked processes.");
    } else {
        let rows: Vec<_> = processes
            .iter()
            .map(|(name, record)| (name, record, is_alive(record.pid)))
            .collect();
        println!("{}", output::process_table(rows.into_iter()));
    }

    if verbose {
        match ctx.orchestrator.registry_client() {
            Ok(client) => match client.list_agents(&[]).await {
                Ok(agents) => {
                    println!("\nRegistry view ({} agent(s)):", agents.len());
                    for agent in agents {
                        let status = match agent.status {
                            mesh_kernel::AgentStatus::Healthy => agent.status.to_string().green(),
                            mesh_kernel::AgentStatus::Degraded => agent.status.to_string().yellow(),
                            _ => agent.status.to_string().red(),
                        };
                        println!(
                            "  {} [{}] {} capabilities, namespace {}",
                            agent.name.cyan(),
                            status,
                            agent.capabilities.len(),
                            agent.namespace
                        );
                    }
                }
                Err(err) => println!("\nRegistry view unavailable: {err}"),
            },
            Err(err) => println!("\nRegistry view unavailable: {err}"),
        }
    }
    Ok(())
}
