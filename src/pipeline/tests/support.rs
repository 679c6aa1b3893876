//! Deterministic collaborators for pipeline tests

#![cfg(test)]

use crate::pipeline::{
    DelayRange, FailureProbability, MessageHandler, PersistError, Persister, RemoteAction,
    RemoteActionError, SimulatedRestart, SimulatedStore,
};
use crate::queue::Message;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Barrier};

pub fn handler_with(persist: FailureProbability, action: FailureProbability) -> MessageHandler {
    MessageHandler::new(
        Arc::new(SimulatedStore::new(DelayRange::NONE, persist)),
        Arc::new(SimulatedRestart::new(DelayRange::NONE, action)),
    )
}

pub fn reliable_handler() -> MessageHandler {
    handler_with(FailureProbability::NEVER, FailureProbability::NEVER)
}

/// Persister that reports entry and then never finishes
pub struct BlockingPersister {
    entered: mpsc::UnboundedSender<String>,
}

impl BlockingPersister {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (entered, rx) = mpsc::unbounded_channel();
        (Self { entered }, rx)
    }
}

#[async_trait]
impl Persister for BlockingPersister {
    async fn persist(&self, message: &Message) -> Result<(), PersistError> {
        let _ = self.entered.send(message.instance_name().to_string());
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Persister that only finishes once the remote action has also started
pub struct RendezvousPersister(pub Arc<Barrier>);

#[async_trait]
impl Persister for RendezvousPersister {
    async fn persist(&self, _message: &Message) -> Result<(), PersistError> {
        self.0.wait().await;
        Ok(())
    }
}

/// Remote action that only finishes once the persister has also started
pub struct RendezvousAction(pub Arc<Barrier>);

#[async_trait]
impl RemoteAction for RendezvousAction {
    async fn perform_action(&self, _message: &Message) -> Result<(), RemoteActionError> {
        self.0.wait().await;
        Ok(())
    }
}

/// Remote action failing its first `failures` attempts
pub struct FlakyAction {
    pub failures: usize,
    pub calls: AtomicUsize,
}

impl FlakyAction {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteAction for FlakyAction {
    async fn perform_action(&self, message: &Message) -> Result<(), RemoteActionError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(RemoteActionError {
                hostname: message.hostname().to_string(),
                reason: "connection reset".to_string(),
            });
        }
        Ok(())
    }
}

/// Remote action that counts the attempts that ran to completion
pub struct SlowAction {
    pub delay: std::time::Duration,
    pub completed: Arc<AtomicUsize>,
}

#[async_trait]
impl RemoteAction for SlowAction {
    async fn perform_action(&self, _message: &Message) -> Result<(), RemoteActionError> {
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
