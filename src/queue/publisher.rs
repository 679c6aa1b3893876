//! Queue Publisher for sending messages
//!
//! Publishers hand messages to the shared queue. Each publisher carries the
//! producer_id it was created for so producers stay independently labelled.

use crate::queue::error::{QueueError, QueueResult};
use crate::queue::message::Message;
use crate::queue::QueueItem;
use tokio::sync::mpsc::UnboundedSender;

/// Publisher handle for sending messages to the queue
///
/// Cloning a publisher is cheap; every clone feeds the same queue. The
/// queue is unbounded, so `put` never waits.
#[derive(Debug, Clone)]
pub struct QueuePublisher {
    producer_id: String,
    sender: UnboundedSender<QueueItem>,
}

impl QueuePublisher {
    pub(crate) fn new(producer_id: String, sender: UnboundedSender<QueueItem>) -> Self {
        Self {
            producer_id,
            sender,
        }
    }

    pub fn producer_id(&self) -> &str {
        &self.producer_id
    }

    /// Enqueue a message
    pub fn put(&self, message: Message) -> QueueResult<()> {
        self.send(QueueItem::Message(message))
    }

    /// Enqueue the end-of-stream marker for this producer
    pub fn finish(&self) -> QueueResult<()> {
        self.send(QueueItem::Done {
            producer_id: self.producer_id.clone(),
        })
    }

    fn send(&self, item: QueueItem) -> QueueResult<()> {
        self.sender.send(item).map_err(|_| QueueError::Closed)
    }
}
