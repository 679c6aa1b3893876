//! Message Handler
//!
//! Runs the two side-effecting sub-operations for a message concurrently,
//! waits for both to settle, classifies the failures, and acknowledges the
//! message. A failure in one sub-operation never cancels the other.

use crate::core::retry::{retry_async, RetryPolicy};
use crate::pipeline::aggregator::{self, Classification, SettledOutcomes};
use crate::pipeline::error::{OperationError, OperationKind, OperationOutcome};
use crate::pipeline::operations::{Persister, RemoteAction};
use crate::queue::Message;
use futures::future::join;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Everything observable about one handled message
#[derive(Debug)]
pub struct HandlerReport {
    pub message: Message,
    pub outcomes: SettledOutcomes,
    pub classifications: Vec<Classification>,
}

/// Per-message processing: save and restart concurrently, then acknowledge
pub struct MessageHandler {
    persister: Arc<dyn Persister>,
    remote: Arc<dyn RemoteAction>,
    retry: RetryPolicy,
    timeout: Option<Duration>,
}

impl MessageHandler {
    pub fn new(persister: Arc<dyn Persister>, remote: Arc<dyn RemoteAction>) -> Self {
        Self {
            persister,
            remote,
            retry: RetryPolicy::default(),
            timeout: None,
        }
    }

    /// Retry policy for the remote action; the default makes a single attempt
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Upper bound on each sub-operation attempt
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Process one message to acknowledgement
    ///
    /// Always returns a report; sub-operation failures are classified, never
    /// propagated. If this future is dropped before finishing, the message is
    /// logged as abandoned and is never acknowledged.
    pub async fn handle(&self, message: Message) -> HandlerReport {
        let (outcomes, classifications) = {
            let guard = AbandonGuard::new(&message);

            let (persist, (remote_action, remote_action_attempts)) =
                join(self.save(&message), self.restart(&message)).await;
            let outcomes = SettledOutcomes {
                persist,
                remote_action,
                remote_action_attempts,
            };
            let classifications = aggregator::classify(&message, &outcomes);

            finalize(&message);
            guard.disarm();
            (outcomes, classifications)
        };

        HandlerReport {
            message,
            outcomes,
            classifications,
        }
    }

    async fn save(&self, message: &Message) -> OperationOutcome {
        let outcome = self
            .bounded(OperationKind::Persist, self.persister.persist(message))
            .await;
        if outcome.is_ok() {
            if !message.mark_saved() {
                log::warn!("{} was already marked saved", message);
            }
            log::info!("Saved {}", message);
        }
        outcome
    }

    async fn restart(&self, message: &Message) -> (OperationOutcome, usize) {
        let attempted = retry_async("restart_host", &self.retry, || {
            self.bounded(
                OperationKind::RemoteAction,
                self.remote.perform_action(message),
            )
        })
        .await;

        if attempted.result.is_ok() {
            if !message.mark_restarted() {
                log::warn!("{} was already marked restarted", message);
            }
            log::info!("Restarted {}", message.hostname());
        }
        (attempted.result, attempted.attempts)
    }

    async fn bounded<F, E>(&self, operation: OperationKind, future: F) -> OperationOutcome
    where
        F: Future<Output = Result<(), E>>,
        E: Into<OperationError>,
    {
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, future).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(OperationError::TimedOut {
                    operation,
                    after: limit,
                }),
            },
            None => future.await.map_err(Into::into),
        }
    }
}

fn finalize(message: &Message) {
    if message.mark_acknowledged() {
        log::info!("Done. Acked {}", message);
    } else {
        log::warn!("{} was already acknowledged", message);
    }
}

// Logs when a handler is cancelled before it could acknowledge its message
struct AbandonGuard<'a> {
    message: &'a Message,
    armed: bool,
}

impl<'a> AbandonGuard<'a> {
    fn new(message: &'a Message) -> Self {
        Self {
            message,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            log::warn!(
                "Abandoned {} (saved={}, restarted={})",
                self.message,
                self.message.is_saved(),
                self.message.is_restarted()
            );
        }
    }
}
