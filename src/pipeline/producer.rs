//! Message Producer
//!
//! Publishes freshly created messages after a random delay. In finite mode
//! the producer stops after its quota and closes its stream with a sentinel.

use crate::pipeline::error::PipelineResult;
use crate::pipeline::operations::DelayRange;
use crate::queue::{Message, QueuePublisher};

pub struct Producer {
    publisher: QueuePublisher,
    delay: DelayRange,
    limit: Option<usize>,
}

impl Producer {
    /// An endless producer
    pub fn new(publisher: QueuePublisher, delay: DelayRange) -> Self {
        Self {
            publisher,
            delay,
            limit: None,
        }
    }

    /// Stop after `limit` messages; `None` publishes until cancelled
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn producer_id(&self) -> &str {
        self.publisher.producer_id()
    }

    /// Publish until the quota is reached, then send the sentinel
    ///
    /// Returns the number of messages published.
    pub async fn run(self) -> PipelineResult<usize> {
        let mut published = 0;

        while self.limit.map_or(true, |limit| published < limit) {
            self.delay.wait().await;

            let message = Message::new(self.producer_id());
            let shown = message.to_string();
            self.publisher.put(message)?;
            published += 1;

            match self.limit {
                Some(limit) => log::info!(
                    "[{}] Published {}/{}: {}",
                    self.producer_id(),
                    published,
                    limit,
                    shown
                ),
                None => log::info!("[{}] Published {}", self.producer_id(), shown),
            }
        }

        self.publisher.finish()?;
        log::info!(
            "[{}] Finished after {} messages",
            self.producer_id(),
            published
        );
        Ok(published)
    }
}
