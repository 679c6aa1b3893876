//! Pipeline test helpers

use async_trait::async_trait;
use mayhem::pipeline::{
    DelayRange, FailureProbability, MessageHandler, PersistError, Persister, SimulatedRestart,
    SimulatedStore,
};
use mayhem::queue::Message;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Handler with zero delays and fixed failure probabilities
pub fn handler(persist: FailureProbability, action: FailureProbability) -> MessageHandler {
    MessageHandler::new(
        Arc::new(SimulatedStore::new(DelayRange::NONE, persist)),
        Arc::new(SimulatedRestart::new(DelayRange::NONE, action)),
    )
}

/// Persister that announces each message it receives and then never returns
pub struct StuckStore {
    entered: mpsc::UnboundedSender<String>,
}

impl StuckStore {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (entered, rx) = mpsc::unbounded_channel();
        (Self { entered }, rx)
    }
}

#[async_trait]
impl Persister for StuckStore {
    async fn persist(&self, message: &Message) -> Result<(), PersistError> {
        let _ = self.entered.send(message.instance_name().to_string());
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Handler whose persist step never finishes
pub fn stuck_handler() -> (MessageHandler, mpsc::UnboundedReceiver<String>) {
    let (store, entered) = StuckStore::new();
    let handler = MessageHandler::new(
        Arc::new(store),
        Arc::new(SimulatedRestart::new(
            DelayRange::NONE,
            FailureProbability::NEVER,
        )),
    );
    (handler, entered)
}
