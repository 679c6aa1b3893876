//! Bounded retry for transient failures in async operations
//!
//! Retries are opt-in: the default policy makes a single attempt.

use std::time::Duration;
use tokio::time::sleep;

/// Configurable retry policy for async operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    /// A policy allowing `retries` extra attempts after the first one
    pub fn with_retries(retries: usize, delay: Duration) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            delay,
        }
    }

    pub fn retries(&self) -> usize {
        self.max_attempts.saturating_sub(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::from_millis(100),
        }
    }
}

/// Result of a retried operation together with the attempts it took
#[derive(Debug)]
pub struct Attempted<T, E> {
    pub result: Result<T, E>,
    pub attempts: usize,
}

/// Execute an async operation, retrying failures up to the policy limit
///
/// # Examples
/// ```rust
/// use mayhem::core::retry::{retry_async, RetryPolicy};
/// use std::time::Duration;
///
/// # async fn example() {
/// let outcome = retry_async(
///     "restart_host",
///     &RetryPolicy::with_retries(2, Duration::from_millis(10)),
///     || async { Ok::<&str, String>("restarted") },
/// )
/// .await;
/// assert_eq!(outcome.attempts, 1);
/// # }
/// ```
pub async fn retry_async<F, T, E, Fut>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Attempted<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(error) if attempt < max_attempts => {
                log::debug!(
                    "Operation '{}' failed on attempt {}/{}, retrying in {:?}: {}",
                    operation_name,
                    attempt,
                    max_attempts,
                    policy.delay,
                    error
                );
                sleep(policy.delay).await;
                attempt += 1;
            }
            Err(error) => {
                return Attempted {
                    result: Err(error),
                    attempts: attempt,
                }
            }
        }
    }
}
