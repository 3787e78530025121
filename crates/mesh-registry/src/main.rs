//! mesh-registry binary: run the registry service.

use clap::Parser;
use mesh_registry::{RegistryServer, RegistryServerConfig, RegistryStorage, RegistryStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// MCP Mesh registry service
#[derive(Parser)]
#[command(name = "mesh-registry")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host to bind the server to
    #[arg(long, default_value = "localhost", env = "MCP_MESH_REGISTRY_HOST")]
    host: String,

    /// Port to bind the server to
    #[arg(long, default_value_t = 8000, env = "MCP_MESH_REGISTRY_PORT")]
    port: u16,

    /// Path to the embedded registry database
    #[arg(long, default_value = "mcp_mesh_registry.db", env = "MCP_MESH_DB_PATH")]
    db_path: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_MESH_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run(args).await {
        error!(error = %err, "registry failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let store = RegistryStore::open(&args.db_path).await?;
    let storage = Arc::new(RegistryStorage::new(store));
    storage.initialize().await?;

    let config = RegistryServerConfig { host: args.host, port: args.port };
    let server = RegistryServer::new(config, storage);

    info!(db = %args.db_path.display(), "starting registry service");
    server
        .serve_with_shutdown(async {
            shutdown_signal().await;
            info!("shutdown signal received");
        })
        .await?;

    info!("registry service stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
