//! Message Queue Component
//!
//! An unbounded, order-preserving hand-off buffer between any number of
//! producers and a single consumer.
//!
//! # Overview
//!
//! - **Multiple Producers**: publishers can be created freely and cloned
//! - **Single Consumer**: the queue is turned into exactly one consumer
//! - **FIFO Delivery**: items arrive in the order their `put` completed
//! - **Unbounded**: `put` never waits; there is no back-pressure
//! - **Sentinels**: a producer may close its stream with [`QueueItem::Done`]
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐
//! │  Producer A  │     │  Producer B  │
//! └──────┬───────┘     └──────┬───────┘
//!        │ put                │ put
//!        ▼                    ▼
//! ┌──────────────────────────────────────┐
//! │  MessageQueue (unbounded FIFO)       │
//! │  ┌───┬───┬───┬───┬───┬───┬───┐       │
//! │  │ 1 │ 2 │ 3 │ 4 │ 5 │ 6 │...│       │
//! │  └───┴───┴───┴───┴───┴───┴───┘       │
//! └──────────────────┬───────────────────┘
//!                    │ get
//!             ┌──────┴──────┐
//!             │  Consumer   │
//!             └─────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use mayhem::queue::{Message, MessageQueue, QueueItem};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = MessageQueue::new();
//! let publisher = queue.create_publisher("producer-1");
//! let mut consumer = queue.into_consumer();
//!
//! publisher.put(Message::new("producer-1"))?;
//! publisher.finish()?;
//!
//! while let Some(QueueItem::Message(message)) = consumer.get().await {
//!     println!("Received: {}", message);
//! }
//! # Ok(())
//! # }
//! ```

mod consumer;
mod error;
mod message;
mod publisher;

pub use consumer::QueueConsumer;
pub use error::{QueueError, QueueResult};
pub use message::{random_instance_name, Message, MessageHeader, HOST_DOMAIN};
pub use publisher::QueuePublisher;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// An entry travelling through the queue
#[derive(Debug)]
pub enum QueueItem {
    /// A unit of work
    Message(Message),
    /// Sentinel: the named producer will not publish anything else
    Done { producer_id: String },
}

/// Unbounded FIFO queue shared by producers and owned by one consumer
///
/// Publishers are created first; [`MessageQueue::into_consumer`] then hands the
/// receiving side to the consumer. Dropping the queue without creating a
/// consumer closes it for every publisher.
pub struct MessageQueue {
    sender: UnboundedSender<QueueItem>,
    receiver: UnboundedReceiver<QueueItem>,
}

impl MessageQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { sender, receiver }
    }

    /// Create a publisher labelled with `producer_id`
    pub fn create_publisher(&self, producer_id: impl Into<String>) -> QueuePublisher {
        QueuePublisher::new(producer_id.into(), self.sender.clone())
    }

    /// Turn the queue into its single consumer
    ///
    /// The queue's own sender is released here, so the consumer observes the
    /// end of the stream once every publisher is dropped.
    pub fn into_consumer(self) -> QueueConsumer {
        QueueConsumer::new(self.receiver)
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
