//! Lifecycle orchestration: registry and agent start / stop / restart.
//!
//! The orchestrator owns the spawn contract: validate the agent file, skip
//! if already running, inject the registry environment (from live registry
//! state, falling back to static config), spawn with stdio pipes open, wait
//! a settle interval, and fail with captured stderr when the process dies
//! during it.

use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use mesh_runtime::RegistryClient;

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::process_tree::is_alive;
use crate::tracker::{ProcessRecord, ProcessTracker, REGISTRY_PROCESS_NAME};

/// How long a spawned agent must survive before we call it started.
/// MCP stdio agents block waiting for protocol input, so an early exit
/// always means a startup error.
const AGENT_SETTLE: Duration = Duration::from_millis(1500);

/// Poll cadence while waiting for the registry health endpoint.
const REGISTRY_POLL: Duration = Duration::from_millis(500);

/// Orchestrates the registry process and agent subprocesses.
pub struct LifecycleOrchestrator {
    config: CliConfig,
    tracker: Arc<ProcessTracker>,
}

impl LifecycleOrchestrator {
    pub fn new(config: CliConfig, tracker: Arc<ProcessTracker>) -> Self {
        Self { config, tracker }
    }

    pub fn tracker(&self) -> Arc<ProcessTracker> {
        self.tracker.clone()
    }

    pub fn config(&self) -> &CliConfig {
        &self.config
    }

    /// Registry client against the live registry state, or static config.
    pub fn registry_client(&self) -> CliResult<RegistryClient> {
        let url = self
            .tracker
            .registry_state()
            .filter(|_| self.tracker.is_registry_state_valid())
            .map(|state| state.url)
            .unwrap_or_else(|| self.config.registry_url());
        RegistryClient::new(url).map_err(CliError::from)
    }

    /// Start the registry unless a live one is already tracked.
    pub async fn ensure_registry_running(&self) -> CliResult<ProcessRecord> {
        if let Some(record) = self.tracker.get(REGISTRY_PROCESS_NAME) {
            if is_alive(record.pid) && self.tracker.is_registry_state_valid() {
                debug!(pid = record.pid, "registry already running");
                return Ok(record);
            }
            self.tracker.untrack(REGISTRY_PROCESS_NAME);
        }

        let url = self.config.registry_url();
        let command = vec![
            registry_binary(),
            "--host".to_string(),
            self.config.registry_host.clone(),
            "--port".to_string(),
            self.config.registry_port.to_string(),
            "--db-path".to_string(),
            self.config.db_path.clone(),
            "--log-level".to_string(),
            self.config.log_level.to_lowercase(),
        ];

        info!(url = %url, "starting registry");
        let log = open_log(REGISTRY_PROCESS_NAME)?;
        let (program, args) = command.split_first().expect("command is non-empty");
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        let mut child = cmd.spawn().map_err(|err| CliError::Startup {
            name: REGISTRY_PROCESS_NAME.to_string(),
            exit_code: None,
            stderr: format!("cannot spawn {program}: {err}"),
        })?;

        let mut metadata = BTreeMap::new();
        metadata.insert("database_path".to_string(), json!(self.config.db_path));
        let record = self.tracker.track(
            REGISTRY_PROCESS_NAME,
            child.id(),
            command,
            "registry",
            metadata,
        );
        self.tracker.update_registry_state(
            &url,
            &self.config.registry_host,
            self.config.registry_port,
            &self.config.db_path,
            serde_json::to_value(&self.config).unwrap_or(Value::Null),
        );

        // Wait for the health endpoint to answer.
        let client = RegistryClient::new(url.clone())?;
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.startup_timeout);
        loop {
            if let Ok(Some(status)) = child.try_wait() {
                self.tracker.untrack(REGISTRY_PROCESS_NAME);
                return Err(CliError::Startup {
                    name: REGISTRY_PROCESS_NAME.to_string(),
                    exit_code: status.code(),
                    stderr: last_log_lines(REGISTRY_PROCESS_NAME),
                });
            }
            if client.is_available().await {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                self.tracker.terminate(REGISTRY_PROCESS_NAME, Duration::from_secs(5));
                return Err(CliError::Timeout(format!(
                    "registry did not become healthy within {}s",
                    self.config.startup_timeout
                )));
            }
            tokio::time::sleep(REGISTRY_POLL).await;
        }
        drop(child);

        info!(pid = record.pid, url = %url, "registry is healthy");
        Ok(record)
    }

    /// Start one agent subprocess per the spawn contract.
    pub async fn start_agent(&self, agent_file: &str) -> CliResult<ProcessRecord> {
        let path = validate_agent_file(agent_file)?;
        let name = agent_name(&path);

        if let Some(existing) = self.tracker.get(&name) {
            if is_alive(existing.pid) {
                info!(name, pid = existing.pid, "agent already running");
                return Ok(existing);
            }
            self.tracker.untrack(&name);
        }

        if !self.tracker.is_registry_state_valid() {
            warn!(name, "registry state unavailable; agent will use static config");
        }
        let env = self.agent_environment();
        let command = vec![path.display().to_string()];
        let workdir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        info!(name, file = %path.display(), "starting agent");
        let log = open_log(&name)?;
        let mut cmd = Command::new(&command[0]);
        cmd.current_dir(&workdir)
            // The application protocol runs over stdin; output goes to the
            // agent's log file.
            .stdin(Stdio::piped())
            .stdout(log.try_clone()?)
            .stderr(log);
        for (key, value) in &env {
            cmd.env(key, value);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        let mut child = cmd.spawn().map_err(|err| CliError::Startup {
            name: name.clone(),
            exit_code: None,
            stderr: format!("cannot spawn {}: {err}", path.display()),
        })?;

        let mut metadata = BTreeMap::new();
        metadata.insert("agent_file".to_string(), json!(path.display().to_string()));
        metadata.insert("working_directory".to_string(), json!(workdir.display().to_string()));
        metadata.insert(
            "registry_url".to_string(),
            json!(env.get("MCP_MESH_REGISTRY_URL")),
        );
        let record = self.tracker.track(&name, child.id(), command, "agent", metadata);

        tokio::time::sleep(AGENT_SETTLE).await;

        if let Ok(Some(status)) = child.try_wait() {
            self.tracker.untrack(&name);
            return Err(CliError::Startup {
                name: name.clone(),
                exit_code: status.code(),
                stderr: last_log_lines(&name),
            });
        }
        // Leak the stdin handle on purpose: the agent's protocol channel
        // must stay open for as long as the controller lives.
        std::mem::forget(child);

        info!(name = %record.name, pid = record.pid, "agent started");
        Ok(record)
    }

    /// Start several agents; failures are collected per file.
    pub async fn start_many(&self, agent_files: &[String]) -> Vec<(String, CliResult<ProcessRecord>)> {
        let mut results = Vec::with_capacity(agent_files.len());
        for file in agent_files {
            results.push((file.clone(), self.start_agent(file).await));
        }
        results
    }

    pub fn stop_agent(&self, name: &str, timeout: Duration) -> bool {
        self.tracker.terminate(name, timeout)
    }

    /// Stop every tracked process, trees first.
    pub fn stop_all(&self, timeout: Duration) -> BTreeMap<String, bool> {
        self.tracker.terminate_all(timeout)
    }

    /// Restart an agent only when the registry is up.
    pub fn restart_agent(&self, name: &str, timeout: Duration) -> CliResult<ProcessRecord> {
        self.tracker.restart_with_dependency_check(
            name,
            &[REGISTRY_PROCESS_NAME.to_string()],
            timeout,
        )
    }

    /// Restart, then poll the registry until the agent reports healthy.
    pub async fn restart_agent_with_registration_wait(
        &self,
        name: &str,
        timeout: Duration,
    ) -> CliResult<ProcessRecord> {
        let record = self.restart_agent(name, timeout)?;
        self.wait_for_agent_registration(name, timeout).await?;
        Ok(record)
    }

    /// Poll the registry at ~1 Hz until the agent is reported healthy.
    pub async fn wait_for_agent_registration(
        &self,
        name: &str,
        timeout: Duration,
    ) -> CliResult<()> {
        let client = self.registry_client()?;
        client
            .wait_until_healthy(name, timeout)
            .await
            .map_err(CliError::from)
    }

    /// Environment injected into spawned agents, snapshotted at spawn time.
    pub fn agent_environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();

        match self.tracker.registry_state() {
            Some(state) if self.tracker.is_registry_state_valid() => {
                env.insert("MCP_MESH_REGISTRY_URL".to_string(), state.url.clone());
                env.insert("MCP_MESH_REGISTRY_HOST".to_string(), state.host.clone());
                env.insert("MCP_MESH_REGISTRY_PORT".to_string(), state.port.to_string());
                env.insert(
                    "MCP_MESH_DATABASE_URL".to_string(),
                    format!("sqlite:///{}", state.database_path),
                );
            }
            _ => {
                env.insert("MCP_MESH_REGISTRY_URL".to_string(), self.config.registry_url());
                env.insert(
                    "MCP_MESH_REGISTRY_HOST".to_string(),
                    self.config.registry_host.clone(),
                );
                env.insert(
                    "MCP_MESH_REGISTRY_PORT".to_string(),
                    self.config.registry_port.to_string(),
                );
                env.insert(
                    "MCP_MESH_DATABASE_URL".to_string(),
                    format!("sqlite:///{}", self.config.db_path),
                );
            }
        }

        env.insert(
            "MCP_MESH_DEBUG".to_string(),
            if self.config.debug_mode { "1" } else { "0" }.to_string(),
        );
        env.insert("MCP_MESH_LOG_LEVEL".to_string(), self.config.log_level.clone());
        env.insert("MCP_MESH_AUTO_PROCESS".to_string(), "true".to_string());
        env.insert("MCP_MESH_AUTO_ENHANCE".to_string(), "true".to_string());
        env
    }
}

/// The agent's tracked name: file stem of its path.
pub fn agent_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "agent".to_string())
}

fn validate_agent_file(agent_file: &str) -> CliResult<PathBuf> {
    let path = PathBuf::from(agent_file);
    let path = path
        .canonicalize()
        .map_err(|_| CliError::NotFound(format!("agent file {agent_file}")))?;
    if !path.is_file() {
        return Err(CliError::Config(format!("{agent_file} is not a file")));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = path.metadata()?.permissions().mode();
        if mode & 0o111 == 0 {
            return Err(CliError::Config(format!("{agent_file} is not executable")));
        }
    }
    Ok(path)
}

/// Locate the registry binary: explicit override, then a sibling of this
/// executable, then PATH.
fn registry_binary() -> String {
    if let Ok(explicit) = std::env::var("MCP_MESH_REGISTRY_BIN") {
        return explicit;
    }
    if let Ok(current) = std::env::current_exe() {
        let sibling = current.with_file_name("mesh-registry");
        if sibling.is_file() {
            return sibling.display().to_string();
        }
    }
    "mesh-registry".to_string()
}

fn open_log(name: &str) -> CliResult<std::fs::File> {
    let dir = crate::logs::log_dir();
    std::fs::create_dir_all(&dir)?;
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(crate::logs::log_path(name))
        .map_err(CliError::from)
}

/// Tail of a process's log, used as the failure detail on early exit.
fn last_log_lines(name: &str) -> String {
    crate::logs::tail(name, 20, None)
        .map(|lines| lines.join("\n"))
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn orchestrator(dir: &TempDir) -> LifecycleOrchestrator {
        let tracker = Arc::new(ProcessTracker::load(Some(dir.path().join("state.json"))));
        LifecycleOrchestrator::new(CliConfig::default(), tracker)
    }

    fn write_script(dir: &TempDir, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        writeln!(file, "{body}").unwrap();
        let mut perms = file.metadata().unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path.display().to_string()
    }

    #[tokio::test]
    async fn missing_agent_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let err = orch.start_agent("/does/not/exist.py").await.unwrap_err();
        assert!(matches!(err, CliError::NotFound(_)));
    }

    #[tokio::test]
    async fn crashing_agent_surfaces_stderr() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let script = write_script(&dir, "broken_agent", "echo 'boom' >&2; exit 3");

        let err = orch.start_agent(&script).await.unwrap_err();
        match err {
            CliError::Startup { name, exit_code, stderr } => {
                assert_eq!(name, "broken_agent");
                assert_eq!(exit_code, Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("expected Startup, got {other:?}"),
        }
        assert!(orch.tracker().get("broken_agent").is_none());
    }

    #[tokio::test]
    async fn started_agent_is_tracked_and_reused() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let script = write_script(&dir, "sleepy_agent", "sleep 60");

        let record = orch.start_agent(&script).await.unwrap();
        assert_eq!(record.name, "sleepy_agent");
        assert!(is_alive(record.pid));
        assert_eq!(
            record.metadata["registry_url"],
            json!("http://localhost:8000")
        );

        // Starting again reuses the live record.
        let again = orch.start_agent(&script).await.unwrap();
        assert_eq!(again.pid, record.pid);

        assert!(orch.stop_agent("sleepy_agent", Duration::from_secs(5)));
    }

    #[test]
    fn environment_falls_back_to_static_config() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let env = orch.agent_environment();
        assert_eq!(env["MCP_MESH_REGISTRY_URL"], "http://localhost:8000");
        assert_eq!(env["MCP_MESH_REGISTRY_PORT"], "8000");
        assert_eq!(env["MCP_MESH_DEBUG"], "0");
        assert_eq!(env["MCP_MESH_AUTO_PROCESS"], "true");
    }
}
