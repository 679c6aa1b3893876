//! Message Dispatcher
//!
//! The queue's single consumer. In endless mode every message is handed to
//! its own registered handler task; in finite mode each handler is awaited
//! inline and the dispatcher stops once every producer has sent its sentinel.

use crate::core::tasks::{TaskError, TaskRegistry};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::handler::{HandlerReport, MessageHandler};
use crate::pipeline::RunMode;
use crate::queue::{Message, QueueConsumer, QueueItem};
use std::convert::Infallible;
use std::sync::Arc;

/// What the dispatcher saw before it stopped
#[derive(Debug, Default)]
pub struct DispatchSummary {
    /// Messages taken off the queue
    pub consumed: usize,
    /// Sentinels received
    pub finished_producers: usize,
    /// Reports of inline handlers (finite mode only)
    pub reports: Vec<HandlerReport>,
}

pub struct Dispatcher {
    consumer: QueueConsumer,
    handler: Arc<MessageHandler>,
    registry: Arc<TaskRegistry>,
    mode: RunMode,
    producers: usize,
}

impl Dispatcher {
    pub fn new(
        consumer: QueueConsumer,
        handler: Arc<MessageHandler>,
        registry: Arc<TaskRegistry>,
        mode: RunMode,
        producers: usize,
    ) -> Self {
        Self {
            consumer,
            handler,
            registry,
            mode,
            producers,
        }
    }

    /// Consume until the stream ends
    ///
    /// Finite mode ends after one sentinel per producer. Both modes end if
    /// every publisher is dropped or shutdown refuses a new handler.
    pub async fn run(mut self) -> PipelineResult<DispatchSummary> {
        let mut summary = DispatchSummary::default();

        while let Some(item) = self.consumer.get().await {
            match item {
                QueueItem::Message(message) => {
                    summary.consumed += 1;
                    log::info!("Consumed {}", message);
                    log::debug!(
                        "{} waited {}ms in the queue",
                        message.message_id(),
                        (chrono::Utc::now() - message.header().timestamp).num_milliseconds()
                    );
                    if !self.dispatch(message, &mut summary).await? {
                        break;
                    }
                }
                QueueItem::Done { producer_id } => {
                    summary.finished_producers += 1;
                    log::debug!(
                        "Producer {} finished ({}/{})",
                        producer_id,
                        summary.finished_producers,
                        self.producers
                    );
                    if self.mode == RunMode::Finite
                        && summary.finished_producers >= self.producers
                    {
                        log::info!(
                            "All {} producers finished; consumed {} messages",
                            self.producers,
                            summary.consumed
                        );
                        break;
                    }
                }
            }
        }

        Ok(summary)
    }

    // Returns false when the dispatcher should stop
    async fn dispatch(
        &self,
        message: Message,
        summary: &mut DispatchSummary,
    ) -> PipelineResult<bool> {
        match self.mode {
            RunMode::Finite => {
                summary.reports.push(self.handler.handle(message).await);
                Ok(true)
            }
            RunMode::Endless => {
                self.registry.reap();
                let name = format!("handler-{}", message.message_id());
                let handler = Arc::clone(&self.handler);
                let spawned = self.registry.spawn(name, async move {
                    handler.handle(message).await;
                    Ok::<(), Infallible>(())
                });
                match spawned {
                    Ok(()) => Ok(true),
                    Err(TaskError::ShuttingDown { task }) => {
                        log::debug!("Dispatcher stopping; {} not started", task);
                        Ok(false)
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }
}
