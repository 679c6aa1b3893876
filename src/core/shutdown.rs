//! Shutdown Coordination
//!
//! Reacts to termination signals, unhandled task errors, or the end of a
//! finite run by cancelling every registered task, waiting for all of them to
//! settle, and stopping the scheduler.
//!
//! Every trigger arrives on one coordinator-owned channel. The lifecycle only
//! moves forward: `Running -> ShutdownRequested -> Draining -> Stopped`.

use crate::core::tasks::{DrainSet, TaskOutcome, TaskRegistry, UnhandledTaskError};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::Id;

/// Lifecycle of the pipeline scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    Running,
    ShutdownRequested,
    Draining,
    Stopped,
}

impl ShutdownPhase {
    /// The only phase this one may advance to
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Running => Some(Self::ShutdownRequested),
            Self::ShutdownRequested => Some(Self::Draining),
            Self::Draining => Some(Self::Stopped),
            Self::Stopped => None,
        }
    }
}

/// Why shutdown was requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// A termination signal, identified by name
    Signal(&'static str),
    /// An error escaped a task boundary
    Fatal(UnhandledTaskError),
    /// A finite run consumed every sentinel
    Completed,
    /// Programmatic request
    Requested,
}

impl ShutdownTrigger {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(name) => write!(f, "signal {name}"),
            Self::Fatal(err) => write!(f, "fatal error ({err})"),
            Self::Completed => write!(f, "run completed"),
            Self::Requested => write!(f, "shutdown request"),
        }
    }
}

/// Cloneable sender side of the coordinator's trigger channel
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    trigger_tx: mpsc::UnboundedSender<ShutdownTrigger>,
    shutdown_requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Deliver a trigger to the coordinator
    pub fn trigger(&self, trigger: ShutdownTrigger) {
        self.shutdown_requested.store(true, Ordering::Release);
        if self.trigger_tx.send(trigger).is_err() {
            log::trace!("Shutdown trigger dropped: coordinator gone");
        }
    }

    pub fn request_shutdown(&self) {
        self.trigger(ShutdownTrigger::Requested);
    }

    pub fn completed(&self) {
        self.trigger(ShutdownTrigger::Completed);
    }

    /// Report an error that escaped a task
    pub fn fatal(&self, error: UnhandledTaskError) {
        log::error!("Unhandled error: {}", error);
        self.trigger(ShutdownTrigger::Fatal(error));
    }

    /// Whether any trigger has been sent
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }
}

/// Outcome of one drain-and-stop sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub trigger: ShutdownTrigger,
    /// Tasks interrupted by cancellation
    pub cancelled: usize,
    /// Tasks that had already finished cleanly when drained
    pub completed: usize,
    /// Tasks that returned an error or panicked, before or during the drain
    pub failed: usize,
}

impl ShutdownReport {
    /// Total number of tasks that settled during the drain
    pub fn settled(&self) -> usize {
        self.cancelled + self.completed + self.failed
    }

    /// Process exit status for this shutdown
    pub fn exit_code(&self) -> i32 {
        if self.trigger.is_fatal() {
            1
        } else {
            0
        }
    }
}

/// Coordinates graceful shutdown of the pipeline
///
/// The coordinator itself runs outside the task registry, so it is never
/// among the tasks it cancels.
pub struct ShutdownCoordinator {
    handle: ShutdownHandle,
    trigger_rx: mpsc::UnboundedReceiver<ShutdownTrigger>,
    registry: Arc<TaskRegistry>,
    report: Option<ShutdownReport>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator with an empty task registry
    pub fn new() -> Self {
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let handle = ShutdownHandle {
            trigger_tx,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        };
        let registry = Arc::new(TaskRegistry::new(handle.clone()));

        Self {
            handle,
            trigger_rx,
            registry,
            report: None,
        }
    }

    pub fn handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    pub fn registry(&self) -> Arc<TaskRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn phase(&self) -> ShutdownPhase {
        self.registry.phase()
    }

    /// Report of the completed shutdown, if one has run
    pub fn report(&self) -> Option<&ShutdownReport> {
        self.report.as_ref()
    }

    /// Subscribe to the platform termination signals
    pub fn install_signal_handlers(&self) {
        setup_signal_handlers(self.handle.clone());
    }

    /// Wait for the next trigger
    pub async fn wait_for_trigger(&mut self) -> ShutdownTrigger {
        // The coordinator holds a sender, so the channel cannot close
        self.trigger_rx
            .recv()
            .await
            .unwrap_or(ShutdownTrigger::Requested)
    }

    /// Wait for a trigger, then drain and stop
    pub async fn run(&mut self) -> ShutdownReport {
        loop {
            let trigger = self.wait_for_trigger().await;
            if let Some(report) = self.shutdown(trigger).await {
                return report;
            }
            if let Some(report) = &self.report {
                return report.clone();
            }
        }
    }

    /// Cancel every registered task, await settlement, and stop
    ///
    /// Idempotent: returns `None` without side effects if shutdown has
    /// already begun.
    pub async fn shutdown(&mut self, trigger: ShutdownTrigger) -> Option<ShutdownReport> {
        if !self.registry.request_shutdown() {
            log::debug!("Shutdown already in progress; ignoring {}", trigger);
            return None;
        }

        match &trigger {
            ShutdownTrigger::Fatal(err) => {
                log::error!("Shutting down after unhandled error: {}", err)
            }
            other => log::info!("Shutting down: {}", other),
        }

        let drain = match self.registry.begin_drain() {
            Ok(drain) => drain,
            Err(e) => {
                log::error!("Could not start draining: {}", e);
                return None;
            }
        };

        let report = drain_tasks(drain, trigger).await;

        if let Err(e) = self.registry.mark_stopped() {
            log::error!("Could not stop scheduler: {}", e);
        }
        log::info!(
            "Shutdown complete ({}): {} cancelled, {} completed, {} failed",
            report.trigger,
            report.cancelled,
            report.completed,
            report.failed
        );

        self.report = Some(report.clone());
        Some(report)
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

async fn drain_tasks(drain: DrainSet, trigger: ShutdownTrigger) -> ShutdownReport {
    let DrainSet {
        mut tasks,
        mut names,
        reaped_failures,
    } = drain;
    log::info!("Cancelling {} outstanding tasks", tasks.len());
    tasks.abort_all();

    let mut report = ShutdownReport {
        trigger,
        cancelled: 0,
        completed: 0,
        failed: reaped_failures,
    };

    while let Some(result) = tasks.join_next_with_id().await {
        match result {
            Ok((id, TaskOutcome::Failed)) => {
                report.failed += 1;
                log::debug!("Task '{}' had failed", task_name(&mut names, id));
            }
            Ok((id, TaskOutcome::Finished)) => {
                report.completed += 1;
                log::trace!("Task '{}' had already completed", task_name(&mut names, id));
            }
            Err(e) if e.is_cancelled() => {
                report.cancelled += 1;
                log::debug!("Task '{}' cancelled", task_name(&mut names, e.id()));
            }
            Err(e) => {
                report.failed += 1;
                log::warn!(
                    "Task '{}' failed while unwinding: {}",
                    task_name(&mut names, e.id()),
                    e
                );
            }
        }
    }

    report
}

fn task_name(names: &mut HashMap<Id, String>, id: Id) -> String {
    names.remove(&id).unwrap_or_else(|| format!("task-{id}"))
}

/// What to do about a received termination signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalResponse {
    Shutdown,
    ForceExit,
}

// The first signal starts a graceful shutdown; any later one forces exit
fn record_signal(
    handle: &ShutdownHandle,
    signal_count: &AtomicUsize,
    name: &'static str,
) -> SignalResponse {
    if signal_count.fetch_add(1, Ordering::AcqRel) >= 1 {
        return SignalResponse::ForceExit;
    }
    handle.trigger(ShutdownTrigger::Signal(name));
    SignalResponse::Shutdown
}

fn respond(handle: &ShutdownHandle, signal_count: &AtomicUsize, name: &'static str) {
    if record_signal(handle, signal_count, name) == SignalResponse::ForceExit {
        log::warn!("{} received during shutdown; exiting", name);
        std::process::exit(130);
    }
}

/// Listen for Ctrl-C through the portable tokio handler
fn spawn_ctrl_c_listener(handle: ShutdownHandle, signal_count: Arc<AtomicUsize>) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            respond(&handle, &signal_count, "CTRL-C");
        }
    });
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(handle: ShutdownHandle) {
    let signal_count = Arc::new(AtomicUsize::new(0));

    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }

        use tokio::signal::unix::{signal, SignalKind};
        let signals = [
            (SignalKind::interrupt(), "SIGINT"),
            (SignalKind::terminate(), "SIGTERM"),
            (SignalKind::hangup(), "SIGHUP"),
            (SignalKind::quit(), "SIGQUIT"),
        ];

        for (kind, name) in signals {
            let handle = handle.clone();
            let sig_ctr = signal_count.clone();

            tokio::spawn(async move {
                match signal(kind) {
                    Ok(mut sig) => {
                        while sig.recv().await.is_some() {
                            respond(&handle, &sig_ctr, name);
                        }
                    }
                    // ctrl_c shares SIGINT, so it only listens when the unix stream is unavailable
                    Err(e) if kind == SignalKind::interrupt() => {
                        log::warn!("Could not subscribe to {}: {}; using Ctrl-C handler", name, e);
                        spawn_ctrl_c_listener(handle, sig_ctr);
                    }
                    Err(e) => log::warn!("Could not subscribe to {}: {}", name, e),
                }
            });
        }
    }

    #[cfg(not(unix))]
    spawn_ctrl_c_listener(handle, signal_count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    fn spawn_pending(registry: &TaskRegistry, name: &str) {
        registry
            .spawn(name.to_string(), async {
                std::future::pending::<()>().await;
                Ok::<(), std::io::Error>(())
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_coordinator_creation() {
        let coordinator = ShutdownCoordinator::new();

        assert_eq!(coordinator.phase(), ShutdownPhase::Running);
        assert!(!coordinator.handle().is_shutdown_requested());
        assert!(coordinator.report().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_stops() {
        let mut coordinator = ShutdownCoordinator::new();
        let registry = coordinator.registry();
        spawn_pending(&registry, "a");
        spawn_pending(&registry, "b");

        coordinator.handle().request_shutdown();
        assert!(coordinator.handle().is_shutdown_requested());

        let report = timeout(Duration::from_secs(1), coordinator.run())
            .await
            .expect("shutdown should finish");

        assert_eq!(report.trigger, ShutdownTrigger::Requested);
        assert_eq!(report.cancelled, 2);
        assert_eq!(report.settled(), 2);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(coordinator.phase(), ShutdownPhase::Stopped);
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let mut coordinator = ShutdownCoordinator::new();
        let registry = coordinator.registry();
        spawn_pending(&registry, "worker");

        let handle = coordinator.handle();
        handle.trigger(ShutdownTrigger::Signal("SIGTERM"));
        handle.trigger(ShutdownTrigger::Signal("SIGINT"));

        let report = coordinator.run().await;
        assert_eq!(report.trigger, ShutdownTrigger::Signal("SIGTERM"));
        assert_eq!(report.cancelled, 1);

        // The queued second trigger must not start another drain
        let second = coordinator.wait_for_trigger().await;
        assert_eq!(second, ShutdownTrigger::Signal("SIGINT"));
        assert!(coordinator.shutdown(second).await.is_none());
        assert_eq!(coordinator.report(), Some(&report));
    }

    #[tokio::test]
    async fn test_spawn_after_stop_is_reported() {
        let mut coordinator = ShutdownCoordinator::new();
        let registry = coordinator.registry();

        coordinator.shutdown(ShutdownTrigger::Requested).await.unwrap();

        let err = registry
            .spawn("too-late", async { Ok::<(), std::io::Error>(()) })
            .unwrap_err();
        assert!(matches!(err, crate::core::tasks::TaskError::Stopped { .. }));
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_fatal_shutdown_exit_code() {
        let mut coordinator = ShutdownCoordinator::new();
        coordinator.handle().fatal(UnhandledTaskError::Failed {
            task: "dispatcher".to_string(),
            reason: "queue closed".to_string(),
        });

        let report = coordinator.run().await;
        assert!(report.trigger.is_fatal());
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_failed_tasks_count_as_failed() {
        let mut coordinator = ShutdownCoordinator::new();
        let registry = coordinator.registry();
        registry
            .spawn("broken", async {
                Err::<(), _>(std::io::Error::other("queue closed"))
            })
            .unwrap();
        registry
            .spawn("panicky", async {
                if true {
                    panic!("invariant broken");
                }
                Ok::<(), std::io::Error>(())
            })
            .unwrap();
        spawn_pending(&registry, "stuck");

        // Both tasks have returned once their triggers arrive
        let first = timeout(Duration::from_secs(1), coordinator.wait_for_trigger())
            .await
            .expect("fatal trigger expected");
        let second = timeout(Duration::from_secs(1), coordinator.wait_for_trigger())
            .await
            .expect("fatal trigger expected");
        assert!(second.is_fatal());

        let report = coordinator.shutdown(first).await.unwrap();
        assert!(report.trigger.is_fatal());
        assert_eq!(report.failed, 2);
        assert_eq!(report.cancelled, 1);
        assert_eq!(report.completed, 0);
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_finished_tasks_count_as_completed() {
        let mut coordinator = ShutdownCoordinator::new();
        let registry = coordinator.registry();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        registry
            .spawn("done", async move {
                let _ = done_tx.send(());
                Ok::<(), std::io::Error>(())
            })
            .unwrap();
        spawn_pending(&registry, "stuck");
        done_rx.await.unwrap();

        let report = coordinator.shutdown(ShutdownTrigger::Completed).await.unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(report.cancelled, 1);
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_second_signal_forces_exit() {
        let mut coordinator = ShutdownCoordinator::new();
        let handle = coordinator.handle();
        let count = AtomicUsize::new(0);

        assert_eq!(
            record_signal(&handle, &count, "SIGTERM"),
            SignalResponse::Shutdown
        );
        assert_eq!(
            record_signal(&handle, &count, "CTRL-C"),
            SignalResponse::ForceExit
        );

        assert_eq!(
            coordinator.wait_for_trigger().await,
            ShutdownTrigger::Signal("SIGTERM")
        );
        assert!(
            timeout(Duration::from_millis(20), coordinator.wait_for_trigger())
                .await
                .is_err(),
            "a forced exit sends no second trigger"
        );
    }

    #[test]
    fn test_phase_order() {
        assert_eq!(
            ShutdownPhase::Running.next(),
            Some(ShutdownPhase::ShutdownRequested)
        );
        assert_eq!(ShutdownPhase::Stopped.next(), None);
        assert!(ShutdownPhase::Draining < ShutdownPhase::Stopped);
    }
}
