//! Process tree discovery and termination.
//!
//! OS-portable operations on process trees rooted at a pid: discovery via
//! the system process table, graceful-then-forced termination (children
//! first), and orphan detection scoped to descendants of the current
//! process. On Unix termination uses SIGTERM/SIGKILL; on Windows it shells
//! out to `taskkill /T`.
//!
//! A process that is already gone — or that we lack permission to signal —
//! counts as successfully terminated: the goal is "not running", and it
//! isn't.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessStatus, System};
use tracing::{debug, warn};

/// Command-line fragments identifying mesh-family processes.
const MESH_PROCESS_SIGNATURES: &[&str] =
    &["mcp-mesh", "mcp_mesh", "mesh-registry", "meshctl", "mesh-agent"];

/// Poll cadence while waiting for processes to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Whether a pid refers to a live (non-zombie) process.
pub fn is_alive(pid: u32) -> bool {
    let mut system = System::new();
    if !system.refresh_process(Pid::from_u32(pid)) {
        return false;
    }
    match system.process(Pid::from_u32(pid)) {
        Some(process) => process.status() != ProcessStatus::Zombie,
        None => false,
    }
}

/// OS-portable controller for process trees.
pub struct ProcessTreeController;

impl ProcessTreeController {
    pub fn new() -> Self {
        Self
    }

    /// The tree rooted at `root`, as a parent → children map.
    pub fn tree(&self, root: u32) -> HashMap<u32, Vec<u32>> {
        let mut system = System::new();
        system.refresh_processes();

        let mut tree: HashMap<u32, Vec<u32>> = HashMap::new();
        let members: HashSet<u32> = std::iter::once(root)
            .chain(self.descendants_in(&system, root))
            .collect();

        for &pid in &members {
            let Some(process) = system.process(Pid::from_u32(pid)) else {
                continue;
            };
            if pid == root {
                tree.entry(root).or_default();
                continue;
            }
            if let Some(parent) = process.parent() {
                tree.entry(parent.as_u32()).or_default().push(pid);
            }
        }
        for children in tree.values_mut() {
            children.sort_unstable();
        }
        tree
    }

    /// All transitive descendants of `root`.
    pub fn descendants(&self, root: u32) -> Vec<u32> {
        let mut system = System::new();
        system.refresh_processes();
        self.descendants_in(&system, root)
    }

    fn descendants_in(&self, system: &System, root: u32) -> Vec<u32> {
        // Child → parent edges from one snapshot, walked breadth-first.
        let mut children_of: HashMap<u32, Vec<u32>> = HashMap::new();
        for (pid, process) in system.processes() {
            if let Some(parent) = process.parent() {
                children_of
                    .entry(parent.as_u32())
                    .or_default()
                    .push(pid.as_u32());
            }
        }

        let mut found = Vec::new();
        let mut frontier = vec![root];
        while let Some(pid) = frontier.pop() {
            if let Some(children) = children_of.get(&pid) {
                for &child in children {
                    found.push(child);
                    frontier.push(child);
                }
            }
        }
        found.sort_unstable();
        found.dedup();
        found
    }

    /// Terminate the whole tree rooted at `root`: children first, graceful
    /// signal, wait up to `timeout`, force-kill stragglers, wait up to
    /// `force_timeout`. Returns per-pid success.
    pub fn terminate_tree(
        &self,
        root: u32,
        timeout: Duration,
        force_timeout: Duration,
    ) -> HashMap<u32, bool> {
        let mut targets = self.descendants(root);
        targets.push(root); // children first, root last

        let mut results: HashMap<u32, bool> = HashMap::new();
        let mut pending: Vec<u32> = Vec::new();

        debug!(root, count = targets.len(), "terminating process tree");
        for &pid in &targets {
            if !is_alive(pid) {
                results.insert(pid, true);
                continue;
            }
            send_terminate(pid);
            results.insert(pid, false);
            pending.push(pid);
        }

        wait_for_exit(&mut pending, &mut results, timeout);

        if !pending.is_empty() {
            warn!(count = pending.len(), "force killing remaining processes");
            for &pid in &pending {
                send_kill(pid);
            }
            wait_for_exit(&mut pending, &mut results, force_timeout);
        }

        for pid in pending {
            warn!(pid, "process survived forced termination");
            results.insert(pid, false);
        }
        results
    }

    /// Descendants of the current process that we do not track and whose
    /// command line looks like a mesh process.
    pub fn find_orphaned(&self, known_pids: &HashSet<u32>) -> Vec<u32> {
        let mut system = System::new();
        system.refresh_processes();

        let mut orphaned = Vec::new();
        for pid in self.descendants_in(&system, std::process::id()) {
            if known_pids.contains(&pid) {
                continue;
            }
            let Some(process) = system.process(Pid::from_u32(pid)) else {
                continue;
            };
            let cmdline = process.cmd().join(" ").to_lowercase();
            if MESH_PROCESS_SIGNATURES.iter().any(|sig| cmdline.contains(sig)) {
                warn!(pid, cmdline = %cmdline, "found orphaned mesh process");
                orphaned.push(pid);
            }
        }
        orphaned
    }

    /// Terminate orphans with a shorter grace period.
    pub fn cleanup_orphaned(&self, orphaned: &[u32]) -> HashMap<u32, bool> {
        let mut results = HashMap::new();
        for &pid in orphaned {
            debug!(pid, "cleaning up orphaned process");
            results.extend(self.terminate_tree(
                pid,
                Duration::from_secs(5),
                Duration::from_secs(3),
            ));
        }
        results
    }
}

impl Default for ProcessTreeController {
    fn default() -> Self {
        Self::new()
    }
}

fn wait_for_exit(pending: &mut Vec<u32>, results: &mut HashMap<u32, bool>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !pending.is_empty() && Instant::now() < deadline {
        pending.retain(|&pid| {
            if is_alive(pid) {
                true
            } else {
                results.insert(pid, true);
                false
            }
        });
        if !pending.is_empty() {
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(unix)]
fn send_terminate(pid: u32) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid as NixPid;
    if let Err(err) = kill(NixPid::from_raw(pid as i32), Some(Signal::SIGTERM)) {
        // ESRCH/EPERM both mean we are done with this pid.
        debug!(pid, error = %err, "SIGTERM not delivered");
    }
}

#[cfg(unix)]
fn send_kill(pid: u32) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid as NixPid;
    if let Err(err) = kill(NixPid::from_raw(pid as i32), Some(Signal::SIGKILL)) {
        debug!(pid, error = %err, "SIGKILL not delivered");
    }
}

#[cfg(windows)]
fn send_terminate(pid: u32) {
    // taskkill /T terminates the tree; graceful first (no /F).
    let _ = std::process::Command::new("taskkill")
        .args(["/T", "/PID", &pid.to_string()])
        .output();
}

#[cfg(windows)]
fn send_kill(pid: u32) {
    let _ = std::process::Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .output();
}
