//! Sliding-window admission control for outbound dispatches.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit admission abandoned after {rounds} wait rounds")]
    Exhausted { rounds: u32 },
}

/// Admits at most `max_requests` attempts within any trailing `window`.
///
/// Callers over the limit are suspended until the oldest admission leaves
/// the window, then re-evaluated from scratch. The read-prune-decide-append
/// sequence runs under one lock so concurrent callers never over-admit.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    /// `None` waits as long as it takes.
    max_wait_rounds: Option<u32>,
    admissions: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            max_wait_rounds: None,
            admissions: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    /// Give up after `rounds` waits instead of suspending indefinitely.
    pub fn with_max_wait_rounds(mut self, rounds: Option<u32>) -> Self {
        self.max_wait_rounds = rounds;
        self
    }

    /// Wait for admission and record it.
    pub async fn check(&self) -> Result<(), RateLimitError> {
        let started = Instant::now();
        let mut rounds = 0;

        loop {
            let Some(wait) = self.try_admit(Instant::now()) else {
                if rounds > 0 {
                    metrics::record_rate_limit_wait(started.elapsed());
                }
                return Ok(());
            };

            if self.max_wait_rounds.is_some_and(|max| rounds >= max) {
                tracing::warn!(rounds, "Rate limit wait abandoned");
                return Err(RateLimitError::Exhausted { rounds });
            }

            rounds += 1;
            tracing::debug!(
                wait_ms = wait.as_millis() as u64,
                round = rounds,
                max_requests = self.max_requests,
                "Rate limit reached, waiting for a free slot"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of admissions currently inside the window.
    pub fn in_window(&self) -> usize {
        let mut admissions = self.admissions.lock().unwrap_or_else(PoisonError::into_inner);
        self.prune(&mut admissions, Instant::now());
        admissions.len()
    }

    /// Admit at `now`, or return how long until the oldest admission expires.
    fn try_admit(&self, now: Instant) -> Option<Duration> {
        let mut admissions = self.admissions.lock().unwrap_or_else(PoisonError::into_inner);
        self.prune(&mut admissions, now);

        if admissions.len() < self.max_requests {
            admissions.push_back(now);
            return None;
        }

        let wait = match admissions.front() {
            Some(&oldest) => self.window.saturating_sub(now.saturating_duration_since(oldest)),
            None => self.window,
        };
        Some(wait)
    }

    fn prune(&self, admissions: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = admissions.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                admissions.pop_front();
            } else {
                break;
            }
        }
    }
}
