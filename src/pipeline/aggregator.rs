//! Result Aggregation
//!
//! Inspects the settled outcomes of a message's sub-operations and logs each
//! failure by kind. Aggregation never fails and never stops the pipeline.

use crate::pipeline::error::{OperationError, OperationOutcome};
use crate::queue::Message;
use uuid::Uuid;

/// Settled outcomes of both sub-operations for one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledOutcomes {
    pub persist: OperationOutcome,
    pub remote_action: OperationOutcome,
    /// Attempts made for the remote action, including the first
    pub remote_action_attempts: usize,
}

impl SettledOutcomes {
    pub fn all_succeeded(&self) -> bool {
        self.persist.is_ok() && self.remote_action.is_ok()
    }
}

/// How a sub-operation failure was classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The durable write failed
    SaveFailed { message_id: Uuid, reason: String },
    /// The remote action failed after every permitted attempt
    RemoteActionFailed {
        hostname: String,
        attempts: usize,
        reason: String,
    },
    /// Anything else, including timeouts
    Unexpected { reason: String },
}

/// Classify and log every failed outcome; successes produce nothing
pub fn classify(message: &Message, outcomes: &SettledOutcomes) -> Vec<Classification> {
    let failures = [&outcomes.persist, &outcomes.remote_action];

    failures
        .into_iter()
        .filter_map(|outcome| outcome.as_ref().err())
        .map(|error| {
            let classification = classify_error(error, outcomes.remote_action_attempts);
            log_classification(message, &classification);
            classification
        })
        .collect()
}

fn classify_error(error: &OperationError, attempts: usize) -> Classification {
    match error {
        OperationError::Persist(e) => Classification::SaveFailed {
            message_id: e.message_id,
            reason: e.reason.clone(),
        },
        OperationError::RemoteAction(e) => Classification::RemoteActionFailed {
            hostname: e.hostname.clone(),
            attempts,
            reason: e.reason.clone(),
        },
        other @ (OperationError::TimedOut { .. } | OperationError::Unexpected { .. }) => {
            Classification::Unexpected {
                reason: other.to_string(),
            }
        }
    }
}

fn log_classification(message: &Message, classification: &Classification) {
    match classification {
        Classification::SaveFailed { reason, .. } => {
            log::error!("Failed to save {}: {}", message, reason)
        }
        Classification::RemoteActionFailed {
            hostname,
            attempts: 1,
            reason,
        } => log::warn!(
            "Remote action failed for {}: {} (not retried)",
            hostname,
            reason
        ),
        Classification::RemoteActionFailed {
            hostname,
            attempts,
            reason,
        } => log::warn!(
            "Remote action failed for {} after {} attempts: {}",
            hostname,
            attempts,
            reason
        ),
        Classification::Unexpected { reason } => {
            log::error!("Unexpected failure while handling {}: {}", message, reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::{OperationKind, PersistError, RemoteActionError};
    use std::time::Duration;

    fn outcomes(persist: OperationOutcome, remote_action: OperationOutcome) -> SettledOutcomes {
        SettledOutcomes {
            persist,
            remote_action,
            remote_action_attempts: 1,
        }
    }

    #[test]
    fn test_successes_produce_no_classification() {
        let message = Message::new("p");
        let settled = outcomes(Ok(()), Ok(()));

        assert!(settled.all_succeeded());
        assert!(classify(&message, &settled).is_empty());
    }

    #[test]
    fn test_each_failure_is_classified_by_kind() {
        let message = Message::with_instance_name("p", "cattle-0001");
        let settled = outcomes(
            Err(PersistError {
                message_id: message.message_id(),
                reason: "disk full".to_string(),
            }
            .into()),
            Err(RemoteActionError {
                hostname: message.hostname().to_string(),
                reason: "host unreachable".to_string(),
            }
            .into()),
        );

        let classes = classify(&message, &settled);
        assert_eq!(
            classes,
            vec![
                Classification::SaveFailed {
                    message_id: message.message_id(),
                    reason: "disk full".to_string(),
                },
                Classification::RemoteActionFailed {
                    hostname: "cattle-0001.example.net".to_string(),
                    attempts: 1,
                    reason: "host unreachable".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_timeouts_and_unknown_errors_are_unexpected() {
        let message = Message::new("p");
        let settled = outcomes(
            Err(OperationError::TimedOut {
                operation: OperationKind::Persist,
                after: Duration::from_millis(50),
            }),
            Err(OperationError::Unexpected {
                operation: OperationKind::RemoteAction,
                reason: "boom".to_string(),
            }),
        );

        let classes = classify(&message, &settled);
        assert_eq!(classes.len(), 2);
        assert!(classes
            .iter()
            .all(|c| matches!(c, Classification::Unexpected { .. })));
        assert!(matches!(
            &classes[0],
            Classification::Unexpected { reason } if reason.contains("timed out")
        ));
    }

    #[test]
    fn test_retry_attempts_are_carried() {
        let message = Message::new("p");
        let settled = SettledOutcomes {
            persist: Ok(()),
            remote_action: Err(RemoteActionError {
                hostname: message.hostname().to_string(),
                reason: "refused".to_string(),
            }
            .into()),
            remote_action_attempts: 3,
        };

        let classes = classify(&message, &settled);
        assert!(matches!(
            classes.as_slice(),
            [Classification::RemoteActionFailed { attempts: 3, .. }]
        ));
    }
}
