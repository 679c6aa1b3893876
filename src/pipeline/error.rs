//! Pipeline Error Types

use crate::core::tasks::TaskError;
use crate::queue::QueueError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Which side-effecting sub-operation an outcome belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Persist,
    RemoteAction,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persist => write!(f, "save"),
            Self::RemoteAction => write!(f, "restart"),
        }
    }
}

/// Durable write of a message failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to save message {message_id}: {reason}")]
pub struct PersistError {
    pub message_id: Uuid,
    pub reason: String,
}

/// Remote host action failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to restart {hostname}: {reason}")]
pub struct RemoteActionError {
    pub hostname: String,
    pub reason: String,
}

/// Failure of a settled sub-operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    RemoteAction(#[from] RemoteActionError),

    #[error("Operation '{operation}' timed out after {after:?}")]
    TimedOut {
        operation: OperationKind,
        after: Duration,
    },

    #[error("Operation '{operation}' failed unexpectedly: {reason}")]
    Unexpected {
        operation: OperationKind,
        reason: String,
    },
}

/// Settled result of one sub-operation
pub type OperationOutcome = Result<(), OperationError>;

/// Errors that end a producer or dispatcher loop
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl crate::core::error_handling::ContextualError for PipelineError {
    fn is_user_actionable(&self) -> bool {
        false
    }

    fn user_message(&self) -> Option<String> {
        None
    }
}
