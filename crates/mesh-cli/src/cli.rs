//! CLI command definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// meshctl - run and manage an MCP Mesh fleet
#[derive(Parser)]
#[command(name = "meshctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the registry and (optionally) agent processes
    Start {
        /// Agent files to start
        agent_files: Vec<String>,

        /// Start only the registry, no agents
        #[arg(long)]
        registry_only: bool,

        /// Return immediately instead of staying in the foreground
        #[arg(long)]
        background: bool,

        /// Registry host override
        #[arg(long)]
        registry_host: Option<String>,

        /// Registry port override
        #[arg(long)]
        registry_port: Option<u16>,

        /// Registry database path override
        #[arg(long)]
        db_path: Option<String>,

        /// Log level override (DEBUG, INFO, WARNING, ERROR, CRITICAL)
        #[arg(long)]
        log_level: Option<String>,

        /// Enable debug mode
        #[arg(long)]
        debug: bool,

        /// Seconds to wait for processes to come up
        #[arg(long)]
        startup_timeout: Option<u64>,
    },

    /// Stop tracked processes
    Stop {
        /// Stop a single agent by name
        #[arg(long)]
        agent: Option<String>,

        /// Skip the graceful phase and kill immediately
        #[arg(long)]
        force: bool,

        /// Seconds to wait for graceful termination
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },

    /// Stop everything and start the registry again
    Restart {
        /// Seconds to wait for graceful termination
        #[arg(long, default_value_t = 30)]
        timeout: u64,

        /// Reset the CLI configuration to defaults first
        #[arg(long)]
        reset_config: bool,
    },

    /// Restart a single agent and wait for it to re-register
    RestartAgent {
        /// Agent name (the tracked process name)
        name: String,

        /// Seconds to wait for shutdown and re-registration
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },

    /// Show tracked processes and registry state
    Status {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Also query the registry for agent health
        #[arg(long)]
        verbose: bool,
    },

    /// List agents and capabilities known to the registry
    List {
        /// List registered agents (default)
        #[arg(long)]
        agents: bool,

        /// List advertised capabilities
        #[arg(long)]
        services: bool,

        /// Filter by fuzzy name match
        #[arg(long)]
        filter: Option<String>,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show process logs
    Logs {
        /// Agent name (defaults to the registry)
        #[arg(long)]
        agent: Option<String>,

        /// Keep following appended lines
        #[arg(short, long)]
        follow: bool,

        /// Minimum level to show (DEBUG, INFO, WARNING, ERROR)
        #[arg(long)]
        level: Option<String>,

        /// Number of trailing lines
        #[arg(long, default_value_t = 100)]
        lines: usize,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

/// `meshctl config` subcommands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show {
        /// Output format
        #[arg(long, default_value = "yaml")]
        format: String,
    },

    /// Set one configuration key
    Set { key: String, value: String },

    /// Reset the configuration file to defaults
    Reset,

    /// Print the configuration file path
    Path,

    /// Write the effective configuration to the config file
    Save,
}
