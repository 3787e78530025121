//! Graceful shutdown coordination for the controller process.
//!
//! Installs termination handlers (SIGTERM / SIGINT / SIGHUP on POSIX,
//! ctrl-c elsewhere) and runs an ordered shutdown: stop accepting work, run
//! registered cleanup handlers in registration order, terminate tracked
//! children by tree, and persist the tracker. Shutdown is idempotent — a
//! second signal while shutdown is in progress is ignored — and a hard
//! deadline forces exit if cleanup stalls.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::tracker::ProcessTracker;

/// Hard ceiling on shutdown work before the process force-exits.
const HARD_DEADLINE: Duration = Duration::from_secs(30);

type CleanupHandler = Box<dyn FnOnce() + Send>;

/// Coordinates ordered, idempotent shutdown of the controller.
pub struct ShutdownCoordinator {
    tracker: Arc<ProcessTracker>,
    child_timeout: Duration,
    in_progress: AtomicBool,
    handlers: Mutex<Vec<CleanupHandler>>,
}

impl ShutdownCoordinator {
    pub fn new(tracker: Arc<ProcessTracker>, child_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            tracker,
            child_timeout,
            in_progress: AtomicBool::new(false),
            handlers: Mutex::new(Vec::new()),
        })
    }

    /// Register a cleanup handler; handlers run in registration order.
    pub fn register_cleanup<F: FnOnce() + Send + 'static>(&self, handler: F) {
        self.handlers.lock().push(Box::new(handler));
    }

    pub fn is_shutting_down(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Wait until a termination signal arrives.
    pub async fn wait_for_signal(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
            let mut hangup = signal(SignalKind::hangup()).expect("install SIGHUP handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("received interrupt"),
                _ = term.recv() => info!("received termination signal"),
                _ = hangup.recv() => info!("received hangup"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("received interrupt");
        }
    }

    /// Run the full shutdown sequence. Safe to call more than once: only
    /// the first call does work.
    pub async fn shutdown(self: &Arc<Self>) {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            info!("shutdown already in progress; ignoring");
            return;
        }

        let this = self.clone();
        let work = tokio::task::spawn_blocking(move || {
            // 1. Cleanup handlers, in registration order.
            let handlers: Vec<CleanupHandler> = std::mem::take(&mut *this.handlers.lock());
            for handler in handlers {
                handler();
            }

            // 2. Terminate tracked children by tree; the tracker persists
            //    after every mutation, so the state file ends up current.
            let results = this.tracker.terminate_all(this.child_timeout);
            let failed: Vec<&String> =
                results.iter().filter(|(_, ok)| !**ok).map(|(name, _)| name).collect();
            if failed.is_empty() {
                info!(stopped = results.len(), "all tracked processes stopped");
            } else {
                warn!(?failed, "some processes did not stop cleanly");
            }
        });

        if tokio::time::timeout(HARD_DEADLINE, work).await.is_err() {
            warn!("shutdown exceeded hard deadline; forcing exit");
            std::process::exit(1);
        }
        info!("shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    #[tokio::test]
    async fn cleanup_handlers_run_in_order_once() {
        let dir = TempDir::new().unwrap();
        let tracker = Arc::new(ProcessTracker::load(Some(dir.path().join("state.json"))));
        let coordinator = ShutdownCoordinator::new(tracker, Duration::from_secs(1));

        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            coordinator.register_cleanup(move || order.lock().push(i));
        }

        coordinator.shutdown().await;
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert!(coordinator.is_shutting_down());

        // Second shutdown is a no-op.
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = count.clone();
            coordinator.register_cleanup(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        coordinator.shutdown().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
