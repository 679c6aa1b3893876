//! Side-effecting collaborators
//!
//! The handler consumes two one-shot async contracts: persisting a message
//! and performing the remote action on its host. The simulated
//! implementations sleep for a random duration and fail with an injectable
//! probability.

use crate::pipeline::error::{PersistError, RemoteActionError};
use crate::queue::Message;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// Durable storage for messages
#[async_trait]
pub trait Persister: Send + Sync {
    async fn persist(&self, message: &Message) -> Result<(), PersistError>;
}

/// Remote control of the host a message refers to
#[async_trait]
pub trait RemoteAction: Send + Sync {
    async fn perform_action(&self, message: &Message) -> Result<(), RemoteActionError>;
}

/// Probability in `[0, 1]` that a simulated operation fails
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailureProbability(f64);

impl FailureProbability {
    pub const NEVER: Self = Self(0.0);
    pub const ALWAYS: Self = Self(1.0);

    /// Returns `None` unless `probability` is within `[0, 1]`
    pub fn new(probability: f64) -> Option<Self> {
        (0.0..=1.0).contains(&probability).then_some(Self(probability))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Decide whether this attempt fails
    pub fn roll(&self) -> bool {
        rand::thread_rng().gen_bool(self.0)
    }
}

impl Default for FailureProbability {
    /// One failure in five
    fn default() -> Self {
        Self(0.2)
    }
}

/// Uniformly distributed delay between `min` and `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min: Duration,
    max: Duration,
}

impl DelayRange {
    pub const NONE: Self = Self {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn up_to(max: Duration) -> Self {
        Self::new(Duration::ZERO, max)
    }

    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay)
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }

    /// Sleep for a sampled duration; a zero delay still yields to the scheduler
    pub async fn wait(&self) {
        let delay = self.sample();
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Stand-in for a durable message store
#[derive(Debug, Clone)]
pub struct SimulatedStore {
    delay: DelayRange,
    failure: FailureProbability,
}

impl SimulatedStore {
    pub fn new(delay: DelayRange, failure: FailureProbability) -> Self {
        Self { delay, failure }
    }
}

#[async_trait]
impl Persister for SimulatedStore {
    async fn persist(&self, message: &Message) -> Result<(), PersistError> {
        self.delay.wait().await;
        if self.failure.roll() {
            return Err(PersistError {
                message_id: message.message_id(),
                reason: "simulated storage failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Stand-in for restarting a remote host
#[derive(Debug, Clone)]
pub struct SimulatedRestart {
    delay: DelayRange,
    failure: FailureProbability,
}

impl SimulatedRestart {
    pub fn new(delay: DelayRange, failure: FailureProbability) -> Self {
        Self { delay, failure }
    }
}

#[async_trait]
impl RemoteAction for SimulatedRestart {
    async fn perform_action(&self, message: &Message) -> Result<(), RemoteActionError> {
        self.delay.wait().await;
        if self.failure.roll() {
            return Err(RemoteActionError {
                hostname: message.hostname().to_string(),
                reason: "simulated restart failure".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_probability_bounds() {
        assert!(FailureProbability::new(-0.1).is_none());
        assert!(FailureProbability::new(1.01).is_none());
        assert!(FailureProbability::new(f64::NAN).is_none());
        assert_eq!(FailureProbability::new(0.5).unwrap().value(), 0.5);
        assert_eq!(FailureProbability::default().value(), 0.2);
    }

    #[test]
    fn test_failure_probability_extremes_are_deterministic() {
        for _ in 0..1000 {
            assert!(!FailureProbability::NEVER.roll());
            assert!(FailureProbability::ALWAYS.roll());
        }
    }

    #[test]
    fn test_delay_range_sampling() {
        let range = DelayRange::new(Duration::from_millis(30), Duration::from_millis(10));
        assert_eq!(range.max(), Duration::from_millis(30));
        for _ in 0..100 {
            let d = range.sample();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(30));
        }
        assert_eq!(DelayRange::NONE.sample(), Duration::ZERO);
        assert_eq!(
            DelayRange::fixed(Duration::from_millis(5)).sample(),
            Duration::from_millis(5)
        );
    }

    #[tokio::test]
    async fn test_simulated_store_outcomes() {
        let message = Message::new("p");

        let reliable = SimulatedStore::new(DelayRange::NONE, FailureProbability::NEVER);
        assert!(reliable.persist(&message).await.is_ok());

        let broken = SimulatedStore::new(DelayRange::NONE, FailureProbability::ALWAYS);
        let err = broken.persist(&message).await.unwrap_err();
        assert_eq!(err.message_id, message.message_id());
    }

    #[tokio::test]
    async fn test_simulated_restart_reports_hostname() {
        let message = Message::with_instance_name("p", "cattle-r00t");
        let broken = SimulatedRestart::new(DelayRange::NONE, FailureProbability::ALWAYS);

        let err = broken.perform_action(&message).await.unwrap_err();
        assert_eq!(err.hostname, "cattle-r00t.example.net");
        assert!(err.to_string().contains("cattle-r00t.example.net"));
    }
}
