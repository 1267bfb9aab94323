//! Retry executor.
//!
//! # Responsibilities
//! - Run a single backend call up to `max_attempts` times
//! - Sleep with exponential backoff between attempts (see `backoff.rs`)
//! - Report how many attempts were made so callers can derive retry counts
//!
//! # Design Decisions
//! - No sleep follows the final attempt
//! - The most recent error is surfaced, earlier errors are logged and dropped
//! - A zero-attempt policy never invokes the operation

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::resilience::backoff::calculate_backoff;

/// Error returned when a retried operation never succeeded.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The policy allowed zero attempts, so the operation was never run.
    #[error("operation failed after all retries: no attempts allowed")]
    NoAttempts,

    /// Every attempt failed; carries the error of the last one.
    #[error("{source}")]
    Exhausted { attempts: u32, source: E },
}

impl<E> RetryError<E> {
    /// Number of times the operation was invoked.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::NoAttempts => 0,
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// Successful value together with the attempt that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    /// 1-indexed attempt number that succeeded.
    pub attempts: u32,
}

/// Exponential backoff retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<Retried<T>, RetryError<E>>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < self.max_attempts {
            attempt += 1;
            match operation().await {
                Ok(value) => {
                    return Ok(Retried {
                        value,
                        attempts: attempt,
                    })
                }
                Err(e) => {
                    if attempt < self.max_attempts {
                        let delay = calculate_backoff(attempt, self.base_delay);
                        tracing::info!(
                            attempt,
                            max_attempts = self.max_attempts,
                            delay = ?delay,
                            error = %e,
                            "Attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        tracing::debug!(attempt, error = %e, "Final attempt failed");
                    }
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(source) => Err(RetryError::Exhausted {
                attempts: attempt,
                source,
            }),
            None => Err(RetryError::NoAttempts),
        }
    }
}

/// Run `operation` with up to `max_retries` attempts and exponential backoff.
pub async fn with_retry<T, E, F, Fut>(
    operation: F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<Retried<T>, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    RetryPolicy::new(max_retries, base_delay).run(operation).await
}
