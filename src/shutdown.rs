//! # Shutdown Coordinator
//!
//! Supervises the long-running loops of one process.
//!
//! ```text
//! spawn(name, loop(child_token)) ──► JoinSet
//!
//! signal / premature exit
//!        └─► shutdown():
//!               ├─ cancel root token
//!               ├─ join all tasks within `timeout`
//!               └─ abort stragglers ─► ShutdownReport { completed, aborted }
//! ```
//!
//! Loops observe cancellation at their own suspension points; the coordinator
//! never interrupts a task except by aborting it after the timeout.

use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How a supervised task ended on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskExit {
    Returned(&'static str),
    Panicked(&'static str),
}

impl TaskExit {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Returned(name) | Self::Panicked(name) => name,
        }
    }
}

/// Outcome of a coordinated shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that returned after cancellation, within the timeout
    pub completed: Vec<&'static str>,
    /// Tasks still running at the deadline, aborted
    pub aborted: Vec<&'static str>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.aborted.is_empty()
    }
}

/// Removes a task's name from the alive set however the task ends
struct AliveGuard {
    name: &'static str,
    alive: Arc<Mutex<HashSet<&'static str>>>,
}

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.alive.lock().remove(self.name);
    }
}

pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: JoinSet<TaskExit>,
    alive: Arc<Mutex<HashSet<&'static str>>>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: JoinSet::new(),
            alive: Arc::new(Mutex::new(HashSet::new())),
            timeout,
        }
    }

    /// Child token for a component; cancelled when shutdown starts
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Supervise `task` under `name`. Names should be unique per process.
    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.alive.lock().insert(name);
        let guard = AliveGuard {
            name,
            alive: Arc::clone(&self.alive),
        };

        self.tasks.spawn(async move {
            let _guard = guard;
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(()) => TaskExit::Returned(name),
                Err(_) => TaskExit::Panicked(name),
            }
        });
        info!(task = name, "Supervised task started");
    }

    /// Names of tasks still running
    pub fn running(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.alive.lock().iter().copied().collect();
        names.sort_unstable();
        names
    }

    /// Resolves when any supervised task ends without being asked to.
    /// Returns `None` when nothing is supervised.
    pub async fn wait_for_exit(&mut self) -> Option<TaskExit> {
        loop {
            match self.tasks.join_next().await? {
                Ok(exit) => {
                    match &exit {
                        TaskExit::Returned(name) => warn!(task = name, "Supervised task exited"),
                        TaskExit::Panicked(name) => error!(task = name, "Supervised task panicked"),
                    }
                    return Some(exit);
                }
                // Only aborted tasks produce join errors; keep waiting
                Err(e) => warn!(error = %e, "Supervised task aborted"),
            }
        }
    }

    /// Cancel every task, wait up to the timeout, abort what is left
    pub async fn shutdown(mut self) -> ShutdownReport {
        info!(
            timeout_ms = self.timeout.as_millis() as u64,
            tasks = self.tasks.len(),
            "Shutting down"
        );
        self.token.cancel();

        let deadline = Instant::now() + self.timeout;
        let mut report = ShutdownReport::default();

        loop {
            match tokio::time::timeout_at(deadline, self.tasks.join_next()).await {
                Ok(Some(Ok(exit))) => {
                    if let TaskExit::Panicked(name) = exit {
                        error!(task = name, "Task panicked during shutdown");
                    }
                    report.completed.push(exit.name());
                }
                Ok(Some(Err(e))) => warn!(error = %e, "Task ended abnormally during shutdown"),
                Ok(None) => break,
                Err(_) => {
                    report.aborted = self.running();
                    warn!(stuck = ?report.aborted, "Shutdown timeout exceeded; aborting tasks");
                    self.tasks.shutdown().await;
                    break;
                }
            }
        }

        info!(completed = ?report.completed, aborted = ?report.aborted, "Shutdown complete");
        report
    }
}

/// Completes when the process receives a termination signal.
///
/// Unix: SIGINT, SIGTERM, SIGQUIT. Elsewhere: Ctrl-C.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigquit.recv() => info!("Received SIGQUIT"),
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
