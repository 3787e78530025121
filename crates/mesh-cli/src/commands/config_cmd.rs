//! `meshctl config` - show and edit the CLI configuration.

use colored::Colorize;

use crate::cli::ConfigCommands;
use crate::config::ConfigManager;
use crate::error::{CliError, CliResult};

pub fn run(config_path: Option<std::path::PathBuf>, action: ConfigCommands) -> CliResult<()> {
    let manager = ConfigManager::new(config_path);
    match action {
        ConfigCommands::Show { format } => {
            let config = manager.load()?;
            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&config)?),
                "yaml" => println!(
                    "{}",
                    serde_yaml::to_string(&config)
                        .map_err(|e| CliError::Config(e.to_string()))?
                ),
                other => {
                    return Err(CliError::Config(format!(
                        "unknown format '{other}': expected yaml or json"
                    )));
                }
            }
        }
        ConfigCommands::Set { key, value } => {
            manager.set(&key, &value)?;
            println!("{} {key} = {value}", "✓".green());
        }
        ConfigCommands::Reset => {
            manager.reset()?;
            println!("{} Configuration reset to defaults", "✓".green());
        }
        ConfigCommands::Path => {
            println!("{}", manager.path().display());
        }
        ConfigCommands::Save => {
            let config = manager.load()?;
            manager.save(&config)?;
            println!("{} Saved to {}", "✓".green(), manager.path().display());
        }
    }
    Ok(())
}
