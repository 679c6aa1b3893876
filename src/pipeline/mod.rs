//! Producer/consumer pipeline
//!
//! Producers publish [`Message`](crate::queue::Message)s to the queue; the
//! [`Dispatcher`] consumes them and runs a [`MessageHandler`] for each one.
//! Every long-lived piece runs as a named task in the
//! [`TaskRegistry`](crate::core::tasks::TaskRegistry) so shutdown can reach it.

pub mod aggregator;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod operations;
pub mod producer;

pub use aggregator::{Classification, SettledOutcomes};
pub use dispatcher::{DispatchSummary, Dispatcher};
pub use error::{
    OperationError, OperationKind, OperationOutcome, PersistError, PipelineError,
    PipelineResult, RemoteActionError,
};
pub use handler::{HandlerReport, MessageHandler};
pub use operations::{
    DelayRange, FailureProbability, Persister, RemoteAction, SimulatedRestart, SimulatedStore,
};
pub use producer::Producer;

use crate::core::shutdown::ShutdownHandle;
use crate::core::tasks::TaskRegistry;
use crate::queue::MessageQueue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Whether producers stop after a quota or publish until shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Finite,
    #[default]
    Endless,
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "finite" => Ok(Self::Finite),
            "endless" => Ok(Self::Endless),
            other => Err(format!("unknown run mode '{other}' (expected finite or endless)")),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite => write!(f, "finite"),
            Self::Endless => write!(f, "endless"),
        }
    }
}

/// Shape of the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub producers: usize,
    pub mode: RunMode,
    /// Quota per producer in finite mode
    pub messages_per_producer: usize,
    pub publish_delay: DelayRange,
}

/// Wires producers, queue, and dispatcher into the task registry
pub struct Pipeline {
    settings: PipelineSettings,
    handler: Arc<MessageHandler>,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings, handler: MessageHandler) -> Self {
        Self {
            settings,
            handler: Arc::new(handler),
        }
    }

    /// Spawn every producer and the dispatcher as registered tasks
    ///
    /// When the dispatcher finishes it reports completion on `shutdown`, which
    /// in finite mode is what ends the run.
    pub fn start(&self, registry: &Arc<TaskRegistry>, shutdown: ShutdownHandle) -> PipelineResult<()> {
        let PipelineSettings {
            producers,
            mode,
            messages_per_producer,
            publish_delay,
        } = self.settings.clone();

        let limit = match mode {
            RunMode::Finite => Some(messages_per_producer),
            RunMode::Endless => None,
        };

        log::info!(
            "Starting {} producer(s) in {} mode{}",
            producers,
            mode,
            limit.map_or(String::new(), |n| format!(", {n} messages each"))
        );

        let queue = MessageQueue::new();
        for index in 1..=producers {
            let name = format!("producer-{index}");
            let producer = Producer::new(queue.create_publisher(name.as_str()), publish_delay)
                .with_limit(limit);
            registry.spawn(name, async move { producer.run().await.map(|_| ()) })?;
        }

        let dispatcher = Dispatcher::new(
            queue.into_consumer(),
            Arc::clone(&self.handler),
            Arc::clone(registry),
            mode,
            producers,
        );
        registry.spawn("dispatcher", async move {
            let summary = dispatcher.run().await?;
            log::info!(
                "Dispatcher finished: {} consumed, {} producers done",
                summary.consumed,
                summary.finished_producers
            );
            shutdown.completed();
            Ok::<(), PipelineError>(())
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests;
