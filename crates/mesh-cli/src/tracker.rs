//! Durable tracking of spawned processes.
//!
//! The tracker owns the controller state file: every spawned process gets a
//! [`ProcessRecord`], the running registry gets a [`RegistryState`], and the
//! whole state is rewritten atomically on every mutation. On load, records
//! whose pid is no longer alive are dropped — and when the dead record is
//! the registry's, the registry state goes with it — so a controller restart
//! never acts on stale pids.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{CliError, CliResult};
use crate::process_tree::{ProcessTreeController, is_alive};

/// Name under which the registry process is tracked.
pub const REGISTRY_PROCESS_NAME: &str = "registry";

/// Delay between stopping and restarting a process.
const RESTART_DELAY: Duration = Duration::from_millis(500);

/// How long a restarted process must survive to count as started.
const RESTART_SETTLE: Duration = Duration::from_millis(200);

/// Last observed health of a tracked process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    #[default]
    Unknown,
}

/// One tracked subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub name: String,
    pub pid: u32,
    pub command: Vec<String>,
    pub service_type: String,
    pub started_at: DateTime<Utc>,
    pub last_health_check: DateTime<Utc>,
    pub health_status: HealthState,
    /// Free-form extras: `agent_file`, `working_directory`, `registry_url`.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ProcessRecord {
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

/// Persisted description of the currently running registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryState {
    pub url: String,
    pub host: String,
    pub port: u16,
    pub database_path: String,
    #[serde(default)]
    pub config: Value,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    processes: BTreeMap<String, ProcessRecord>,
    #[serde(default)]
    registry_state: Option<RegistryState>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

/// Default state file location.
pub fn default_state_path() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcp_mesh")
        .join("processes.json")
}

/// Durable record of spawned processes plus registry state.
pub struct ProcessTracker {
    state_path: PathBuf,
    state: Mutex<StateFile>,
    tree: ProcessTreeController,
}

impl ProcessTracker {
    /// Load the tracker from `state_path`, validating every stored pid.
    pub fn load(state_path: Option<PathBuf>) -> Self {
        let state_path = state_path.unwrap_or_else(default_state_path);
        let mut state = match std::fs::read_to_string(&state_path) {
            Ok(raw) => serde_json::from_str::<StateFile>(&raw).unwrap_or_else(|err| {
                warn!(path = %state_path.display(), error = %err, "corrupt state file; starting fresh");
                StateFile::default()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StateFile::default(),
            Err(err) => {
                warn!(path = %state_path.display(), error = %err, "cannot read state file; starting fresh");
                StateFile::default()
            }
        };

        // Drop records whose process died while we were not looking.
        let mut dropped_registry = false;
        state.processes.retain(|name, record| {
            if is_alive(record.pid) {
                debug!(name, pid = record.pid, "restored process record");
                true
            } else {
                info!(name, pid = record.pid, "tracked process is no longer running");
                if name == REGISTRY_PROCESS_NAME {
                    dropped_registry = true;
                }
                false
            }
        });
        if dropped_registry || !state.processes.contains_key(REGISTRY_PROCESS_NAME) {
            if state.registry_state.take().is_some() {
                info!("cleared stale registry state");
            }
        }

        let tracker = Self {
            state_path,
            state: Mutex::new(state),
            tree: ProcessTreeController::new(),
        };
        tracker.save();
        tracker
    }

    /// Rewrite the state file wholesale; failures are logged, not raised —
    /// in-memory state stays authoritative for this process.
    fn save(&self) {
        let state = self.state.lock();
        if let Err(err) = self.write_state(&state) {
            error!(path = %self.state_path.display(), error = %err, "failed to save process state");
        }
    }

    fn write_state(&self, state: &StateFile) -> CliResult<()> {
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let snapshot = StateFile {
            processes: state.processes.clone(),
            registry_state: state.registry_state.clone(),
            last_updated: Some(Utc::now()),
        };
        let raw = serde_json::to_string_pretty(&snapshot)?;
        let tmp = self.state_path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.state_path)?;
        Ok(())
    }

    /// Start tracking a process, replacing any prior record by that name.
    pub fn track(
        &self,
        name: &str,
        pid: u32,
        command: Vec<String>,
        service_type: &str,
        metadata: BTreeMap<String, Value>,
    ) -> ProcessRecord {
        let record = ProcessRecord {
            name: name.to_string(),
            pid,
            command,
            service_type: service_type.to_string(),
            started_at: Utc::now(),
            last_health_check: Utc::now(),
            health_status: HealthState::Unknown,
            metadata,
        };
        self.state
            .lock()
            .processes
            .insert(name.to_string(), record.clone());
        self.save();
        info!(name, pid, "tracking process");
        record
    }

    /// Stop tracking a process. Returns false when it was not tracked.
    pub fn untrack(&self, name: &str) -> bool {
        let removed = self.state.lock().processes.remove(name);
        if let Some(record) = &removed {
            info!(name, pid = record.pid, "stopped tracking process");
            self.save();
        }
        removed.is_some()
    }

    pub fn get(&self, name: &str) -> Option<ProcessRecord> {
        self.state.lock().processes.get(name).cloned()
    }

    pub fn all(&self) -> BTreeMap<String, ProcessRecord> {
        self.state.lock().processes.clone()
    }

    /// Tracked processes whose pid is currently alive.
    pub fn running(&self) -> BTreeMap<String, ProcessRecord> {
        self.state
            .lock()
            .processes
            .iter()
            .filter(|(_, record)| is_alive(record.pid))
            .map(|(name, record)| (name.clone(), record.clone()))
            .collect()
    }

    /// Refresh the recorded health of one process.
    pub fn update_health(&self, name: &str) -> Option<HealthState> {
        let mut state = self.state.lock();
        let record = state.processes.get_mut(name)?;
        record.health_status = if is_alive(record.pid) {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        };
        record.last_health_check = Utc::now();
        let health = record.health_status;
        drop(state);
        self.save();
        Some(health)
    }

    /// Drop records whose process is gone. Returns the removed names.
    pub fn cleanup_dead(&self) -> Vec<String> {
        let mut removed = Vec::new();
        {
            let mut state = self.state.lock();
            state.processes.retain(|name, record| {
                if is_alive(record.pid) {
                    true
                } else {
                    info!(name, pid = record.pid, "cleaned up dead process record");
                    removed.push(name.clone());
                    false
                }
            });
        }
        if !removed.is_empty() {
            self.save();
        }
        removed
    }

    /// Gracefully terminate one tracked process, forcing after `timeout`.
    /// Untracks on success. A process that is already gone counts as
    /// stopped.
    pub fn terminate(&self, name: &str, timeout: Duration) -> bool {
        let Some(record) = self.get(name) else {
            warn!(name, "process not found for termination");
            return false;
        };

        let results = self
            .tree
            .terminate_tree(record.pid, timeout, Duration::from_secs(5).min(timeout));
        let ok = results.get(&record.pid).copied().unwrap_or(true);
        if ok {
            self.untrack(name);
        }
        ok
    }

    /// Terminate every tracked process, trees first. Returns per-name
    /// success; partial failure leaves the failing records tracked.
    pub fn terminate_all(&self, timeout: Duration) -> BTreeMap<String, bool> {
        let names: Vec<String> = self.state.lock().processes.keys().cloned().collect();
        let mut results = BTreeMap::new();
        for name in names {
            results.insert(name.clone(), self.terminate(&name, timeout));
        }
        results
    }

    /// Restart a tracked process, preserving its service type, command, and
    /// metadata unless overridden. Fails when the replacement dies within
    /// the settle window.
    pub fn restart(
        &self,
        name: &str,
        new_command: Option<Vec<String>>,
        new_metadata: Option<BTreeMap<String, Value>>,
        timeout: Duration,
    ) -> CliResult<ProcessRecord> {
        let record = self
            .get(name)
            .ok_or_else(|| CliError::NotFound(format!("process {name}")))?;

        let command = new_command.unwrap_or_else(|| record.command.clone());
        let metadata = new_metadata.unwrap_or_else(|| record.metadata.clone());
        let service_type = record.service_type.clone();

        info!(name, pid = record.pid, "restarting process");
        if !self.terminate(name, timeout) {
            return Err(CliError::Termination(format!(
                "could not stop {name} (pid {}) for restart",
                record.pid
            )));
        }

        std::thread::sleep(RESTART_DELAY);

        let working_dir = metadata
            .get("working_directory")
            .and_then(Value::as_str)
            .unwrap_or(".")
            .to_string();

        let (program, args) = command
            .split_first()
            .ok_or_else(|| CliError::Config(format!("process {name} has an empty command")))?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // New process group so tree termination stays scoped to it.
            cmd.process_group(0);
        }
        let mut child = cmd.spawn().map_err(|err| CliError::Startup {
            name: name.to_string(),
            exit_code: None,
            stderr: err.to_string(),
        })?;

        let new_record = self.track(name, child.id(), command, &service_type, metadata);

        std::thread::sleep(RESTART_SETTLE);
        if let Ok(Some(status)) = child.try_wait() {
            self.untrack(name);
            return Err(CliError::Startup {
                name: name.to_string(),
                exit_code: status.code(),
                stderr: format!("process exited during restart settle ({status})"),
            });
        }
        // Detach; the tracker owns the pid from here.
        drop(child);

        info!(name, pid = new_record.pid, "restart complete");
        Ok(new_record)
    }

    /// Restart, but only when every named dependency is tracked and alive.
    pub fn restart_with_dependency_check(
        &self,
        name: &str,
        dependencies: &[String],
        timeout: Duration,
    ) -> CliResult<ProcessRecord> {
        let missing: Vec<&str> = dependencies
            .iter()
            .filter(|dep| match self.get(dep) {
                Some(record) => !is_alive(record.pid),
                None => true,
            })
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(CliError::NotFound(format!(
                "cannot restart {name}: missing dependencies: {}",
                missing.join(", ")
            )));
        }
        self.restart(name, None, None, timeout)
    }

    /// Reap orphaned mesh processes among our descendants.
    pub fn cleanup_orphaned(&self) -> BTreeMap<u32, bool> {
        let known: HashSet<u32> = self
            .state
            .lock()
            .processes
            .values()
            .map(|record| record.pid)
            .collect();
        let orphaned = self.tree.find_orphaned(&known);
        if orphaned.is_empty() {
            return BTreeMap::new();
        }
        info!(count = orphaned.len(), "cleaning up orphaned processes");
        self.tree
            .cleanup_orphaned(&orphaned)
            .into_iter()
            .collect()
    }

    // ── Registry state ───────────────────────────────────────────────────

    pub fn update_registry_state(
        &self,
        url: &str,
        host: &str,
        port: u16,
        database_path: &str,
        config: Value,
    ) {
        self.state.lock().registry_state = Some(RegistryState {
            url: url.to_string(),
            host: host.to_string(),
            port,
            database_path: database_path.to_string(),
            config,
            last_updated: Utc::now(),
        });
        self.save();
        info!(url, "updated registry state");
    }

    pub fn registry_state(&self) -> Option<RegistryState> {
        self.state.lock().registry_state.clone()
    }

    /// True iff registry state exists and a live `registry` record backs it.
    pub fn is_registry_state_valid(&self) -> bool {
        let alive = {
            let state = self.state.lock();
            if state.registry_state.is_none() {
                return false;
            }
            state
                .processes
                .get(REGISTRY_PROCESS_NAME)
                .map(|record| is_alive(record.pid))
                .unwrap_or(false)
        };
        if !alive {
            self.clear_registry_state();
        }
        alive
    }

    fn clear_registry_state(&self) {
        if self.state.lock().registry_state.take().is_some() {
            debug!("cleared registry state");
            self.save();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn tracker_in(dir: &TempDir) -> ProcessTracker {
        ProcessTracker::load(Some(dir.path().join("processes.json")))
    }

    fn spawn_sleeper() -> std::process::Child {
        Command::new("sleep")
            .arg("60")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn sleep")
    }

    #[test]
    fn track_untrack_track_leaves_one_record() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker_in(&dir);
        let child = spawn_sleeper();

        tracker.track("p", child.id(), vec!["sleep".into(), "60".into()], "agent", BTreeMap::new());
        assert!(tracker.untrack("p"));
        assert!(!tracker.untrack("p"));
        tracker.track("p", child.id(), vec!["sleep".into(), "60".into()], "agent", BTreeMap::new());
        assert_eq!(tracker.all().len(), 1);

        let mut child = child;
        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn load_drops_dead_records_but_keeps_live_ones() {
        let dir = TempDir::new().unwrap();
        let mut dead_child = spawn_sleeper();
        let live_child = spawn_sleeper();
        let dead_pid = dead_child.id();

        {
            let tracker = tracker_in(&dir);
            tracker.track("dead", dead_pid, vec!["sleep".into()], "agent", BTreeMap::new());
            tracker.track("live", live_child.id(), vec!["sleep".into()], "agent", BTreeMap::new());
        }
        dead_child.kill().unwrap();
        dead_child.wait().unwrap();

        let tracker = tracker_in(&dir);
        assert!(tracker.get("dead").is_none());
        assert!(tracker.get("live").is_some());
        assert!(tracker.cleanup_dead().is_empty());

        let mut live_child = live_child;
        live_child.kill().unwrap();
        live_child.wait().unwrap();
    }

    #[test]
    fn registry_state_is_dropped_when_registry_dies() {
        let dir = TempDir::new().unwrap();
        let mut registry = spawn_sleeper();
        let agent = spawn_sleeper();

        {
            let tracker = tracker_in(&dir);
            tracker.track(
                REGISTRY_PROCESS_NAME,
                registry.id(),
                vec!["sleep".into()],
                "registry",
                BTreeMap::new(),
            );
            tracker.track("hello_world", agent.id(), vec!["sleep".into()], "agent", BTreeMap::new());
            tracker.update_registry_state(
                "http://localhost:8000",
                "localhost",
                8000,
                "/tmp/registry.db",
                json!({}),
            );
            assert!(tracker.is_registry_state_valid());
        }

        // Crash the registry without a clean shutdown.
        registry.kill().unwrap();
        registry.wait().unwrap();

        let tracker = tracker_in(&dir);
        assert!(tracker.registry_state().is_none());
        assert!(!tracker.is_registry_state_valid());
        // The live agent record survives the reload.
        assert!(tracker.get("hello_world").is_some());
        assert!(tracker.cleanup_dead().is_empty());

        let mut agent = agent;
        agent.kill().unwrap();
        agent.wait().unwrap();
    }

    #[test]
    fn terminate_stops_and_untracks() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker_in(&dir);
        let child = spawn_sleeper();
        let pid = child.id();
        tracker.track("p", pid, vec!["sleep".into(), "60".into()], "agent", BTreeMap::new());

        assert!(tracker.terminate("p", Duration::from_secs(5)));
        assert!(tracker.get("p").is_none());

        // Reap the zombie.
        let mut child = child;
        let _ = child.wait();
        assert!(!is_alive(pid));
    }

    #[test]
    fn terminate_unknown_process_is_false() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker_in(&dir);
        assert!(!tracker.terminate("ghost", Duration::from_secs(1)));
    }

    #[test]
    fn restart_spawns_a_replacement() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker_in(&dir);
        let child = spawn_sleeper();
        let old_pid = child.id();
        tracker.track("p", old_pid, vec!["sleep".into(), "60".into()], "agent", BTreeMap::new());

        let record = tracker.restart("p", None, None, Duration::from_secs(5)).unwrap();
        assert_ne!(record.pid, old_pid);
        assert_eq!(record.service_type, "agent");
        assert!(is_alive(record.pid));

        let mut child = child;
        let _ = child.wait();
        assert!(tracker.terminate("p", Duration::from_secs(5)));
    }

    #[test]
    fn restart_fails_when_replacement_dies_immediately() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker_in(&dir);
        let child = spawn_sleeper();
        tracker.track("p", child.id(), vec!["false".into()], "agent", BTreeMap::new());

        let err = tracker.restart("p", None, None, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, CliError::Startup { .. }));
        assert!(tracker.get("p").is_none());

        let mut child = child;
        let _ = child.wait();
    }

    #[test]
    fn dependency_check_blocks_restart() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker_in(&dir);
        let child = spawn_sleeper();
        tracker.track("p", child.id(), vec!["sleep".into(), "60".into()], "agent", BTreeMap::new());

        let err = tracker
            .restart_with_dependency_check("p", &["registry".to_string()], Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, CliError::NotFound(_)));
        // The process was not touched.
        assert!(is_alive(tracker.get("p").unwrap().pid));

        assert!(tracker.terminate("p", Duration::from_secs(5)));
        let mut child = child;
        let _ = child.wait();
    }
}
