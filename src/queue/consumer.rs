//! Queue Consumer for receiving messages
//!
//! There is exactly one consumer per queue. It takes ownership of each item
//! it receives.

use crate::queue::QueueItem;
use tokio::sync::mpsc::UnboundedReceiver;

/// Consumer handle for reading items from the queue
pub struct QueueConsumer {
    receiver: UnboundedReceiver<QueueItem>,
}

impl QueueConsumer {
    pub(crate) fn new(receiver: UnboundedReceiver<QueueItem>) -> Self {
        Self { receiver }
    }

    /// Wait for the next item
    ///
    /// Returns `None` once every publisher has been dropped and the queue is
    /// empty. Cancel-safe: an item is never lost if this future is dropped.
    pub async fn get(&mut self) -> Option<QueueItem> {
        self.receiver.recv().await
    }

    /// Take the next item if one is already waiting
    pub fn try_get(&mut self) -> Option<QueueItem> {
        self.receiver.try_recv().ok()
    }

    /// Number of items currently buffered
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
