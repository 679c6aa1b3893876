//! Task Registry
//!
//! An explicit, enumerable group of every background task the pipeline
//! spawns. The shutdown coordinator drains this group instead of relying on
//! a runtime-wide task listing.
//!
//! Each task is wrapped so that an `Err` return or a panic escaping it is
//! converted into an [`UnhandledTaskError`] and delivered to the coordinator's
//! fatal channel rather than being lost with the task.

use crate::core::shutdown::{ShutdownHandle, ShutdownPhase};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::task::{Id, JoinSet};

/// An error that escaped a task boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnhandledTaskError {
    #[error("Task '{task}' failed: {reason}")]
    Failed { task: String, reason: String },

    #[error("Task '{task}' panicked: {reason}")]
    Panicked { task: String, reason: String },
}

impl UnhandledTaskError {
    pub fn task(&self) -> &str {
        match self {
            Self::Failed { task, .. } | Self::Panicked { task, .. } => task,
        }
    }
}

/// Reasons a spawn request is refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Cannot spawn '{task}': shutdown in progress")]
    ShuttingDown { task: String },

    #[error("Cannot spawn '{task}': scheduler already stopped")]
    Stopped { task: String },

    #[error("Invalid lifecycle transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: ShutdownPhase,
        to: ShutdownPhase,
    },
}

pub type TaskResult<T> = Result<T, TaskError>;

/// How a registered task ended on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Finished,
    /// Returned `Err` or panicked; already reported on the fatal channel
    Failed,
}

struct RegistryState {
    phase: ShutdownPhase,
    tasks: JoinSet<TaskOutcome>,
    names: HashMap<Id, String>,
    // Failed tasks already reaped, so the drain can still count them
    reaped_failures: usize,
}

impl RegistryState {
    fn advance(&mut self, to: ShutdownPhase) -> TaskResult<()> {
        if self.phase.next() != Some(to) {
            return Err(TaskError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        log::debug!("Lifecycle {:?} -> {:?}", self.phase, to);
        self.phase = to;
        Ok(())
    }

    fn settle(&mut self, id: Id) -> Option<String> {
        self.names.remove(&id)
    }
}

/// The set of tasks taken out of the registry for draining
pub(crate) struct DrainSet {
    pub tasks: JoinSet<TaskOutcome>,
    pub names: HashMap<Id, String>,
    pub reaped_failures: usize,
}

/// Registry of live pipeline tasks
pub struct TaskRegistry {
    state: Mutex<RegistryState>,
    shutdown: ShutdownHandle,
}

impl TaskRegistry {
    pub fn new(shutdown: ShutdownHandle) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                phase: ShutdownPhase::Running,
                tasks: JoinSet::new(),
                names: HashMap::new(),
                reaped_failures: 0,
            }),
            shutdown,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // The state is never left half-updated, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> ShutdownPhase {
        self.lock().phase
    }

    /// Spawn a named task into the group
    ///
    /// Refused once shutdown has been requested. A spawn after `Stopped` is a
    /// programming error: it is logged at error level and returned.
    pub fn spawn<F, E>(&self, name: impl Into<String>, future: F) -> TaskResult<()>
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let name = name.into();
        let mut state = self.lock();
        match state.phase {
            ShutdownPhase::Running => {}
            ShutdownPhase::ShutdownRequested | ShutdownPhase::Draining => {
                log::debug!("Rejected spawn of '{}' during shutdown", name);
                return Err(TaskError::ShuttingDown { task: name });
            }
            ShutdownPhase::Stopped => {
                log::error!("Attempted to spawn '{}' after the scheduler stopped", name);
                return Err(TaskError::Stopped { task: name });
            }
        }

        let shutdown = self.shutdown.clone();
        let task_name = name.clone();
        let handle = state.tasks.spawn(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(())) => return TaskOutcome::Finished,
                Ok(Err(e)) => shutdown.fatal(UnhandledTaskError::Failed {
                    task: task_name,
                    reason: e.to_string(),
                }),
                Err(payload) => shutdown.fatal(UnhandledTaskError::Panicked {
                    task: task_name,
                    reason: panic_message(payload.as_ref()),
                }),
            }
            TaskOutcome::Failed
        });
        log::trace!("Spawned task '{}' ({})", name, handle.id());
        state.names.insert(handle.id(), name);
        Ok(())
    }

    /// Number of tasks not yet reaped
    pub fn live_count(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Names of tasks not yet reaped
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().names.values().cloned().collect();
        names.sort();
        names
    }

    /// Drop the bookkeeping for tasks that have already finished
    pub fn reap(&self) -> usize {
        let mut state = self.lock();
        let mut reaped = 0;
        while let Some(result) = state.tasks.try_join_next_with_id() {
            let id = match result {
                Ok((id, TaskOutcome::Finished)) => id,
                Ok((id, TaskOutcome::Failed)) => {
                    state.reaped_failures += 1;
                    id
                }
                Err(e) => e.id(),
            };
            state.settle(id);
            reaped += 1;
        }
        if reaped > 0 {
            log::trace!("Reaped {} finished tasks", reaped);
        }
        reaped
    }

    /// Running -> ShutdownRequested. Returns `false` if shutdown already began.
    pub(crate) fn request_shutdown(&self) -> bool {
        self.lock()
            .advance(ShutdownPhase::ShutdownRequested)
            .is_ok()
    }

    /// ShutdownRequested -> Draining, handing every live task to the caller
    pub(crate) fn begin_drain(&self) -> TaskResult<DrainSet> {
        let mut state = self.lock();
        state.advance(ShutdownPhase::Draining)?;
        Ok(DrainSet {
            tasks: std::mem::take(&mut state.tasks),
            names: std::mem::take(&mut state.names),
            reaped_failures: std::mem::take(&mut state.reaped_failures),
        })
    }

    /// Draining -> Stopped
    pub(crate) fn mark_stopped(&self) -> TaskResult<()> {
        self.lock().advance(ShutdownPhase::Stopped)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
