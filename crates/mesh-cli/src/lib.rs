//! Controller library for the MCP Mesh CLI.
//!
//! `meshctl` manages a local mesh fleet: it spawns the registry and agent
//! subprocesses, tracks them durably across controller restarts, terminates
//! whole process trees, reaps orphans, and renders fleet status. The binary
//! in `main.rs` is a thin dispatcher over these modules.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logs;
pub mod orchestrator;
pub mod output;
pub mod process_tree;
pub mod signals;
pub mod tracker;

pub use config::{CliConfig, ConfigManager};
pub use error::{CliError, CliResult};
pub use orchestrator::LifecycleOrchestrator;
pub use process_tree::ProcessTreeController;
pub use tracker::{ProcessRecord, ProcessTracker, RegistryState};
