//! `meshctl list` - agents and capabilities from the registry.

use colored::Colorize;
use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};
use serde_json::{Value, json};

use crate::commands::Context;
use crate::error::CliResult;
use crate::output;

pub async fn run(
    config_path: Option<std::path::PathBuf>,
    agents: bool,
    services: bool,
    filter: Option<String>,
    json_output: bool,
) -> CliResult<()> {
    let ctx = Context::load(config_path)?;
    let client = ctx.orchestrator.registry_client()?;
    // Default to agents when neither flag is given.
    let list_agents = agents || !services;

    if list_agents {
        let found = client.list_agents(&[]).await?;
        let found: Vec<_> = found
            .into_iter()
            .filter(|agent| match &filter {
                Some(pattern) => mesh_kernel::fuzzy_match(pattern, &agent.name),
                None => true,
            })
            .collect();

        if json_output {
            println!("{}", output::json_ok(json!({"agents": found, "count": found.len()})));
        } else {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL_CONDENSED);
            table.set_header(vec!["NAME", "NAMESPACE", "STATUS", "CAPABILITIES", "ENDPOINT"]);
            for agent in &found {
                let caps: Vec<&str> =
                    agent.capabilities.iter().map(|c| c.name.as_str()).collect();
                table.add_row(vec![
                    agent.name.clone(),
                    agent.namespace.clone(),
                    agent.status.to_string(),
                    caps.join(", "),
                    agent.endpoint.clone(),
                ]);
            }
            println!("{} agent(s) registered", found.len().to_string().cyan());
            println!("{table}");
        }
    }

    if services {
        let mut params: Vec<(&str, &str)> = vec![("agent_status", "any")];
        if let Some(pattern) = &filter {
            params.push(("name", pattern));
            params.push(("fuzzy_match", "true"));
        }
        let capabilities = client.list_capabilities(&params).await?;

        if json_output {
            println!(
                "{}",
                output::json_ok(json!({"capabilities": capabilities, "count": capabilities.len()}))
            );
        } else {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL_CONDENSED);
            table.set_header(vec!["CAPABILITY", "VERSION", "AGENT", "STABILITY", "DESCRIPTION"]);
            for cap in &capabilities {
                let field = |key: &str| {
                    cap.get(key)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                table.add_row(vec![
                    field("name"),
                    field("version"),
                    field("agent_name"),
                    field("stability"),
                    field("description"),
                ]);
            }
            println!("{} capability(ies) advertised", capabilities.len().to_string().cyan());
            println!("{table}");
        }
    }
    Ok(())
}
