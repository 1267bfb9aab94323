//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: backend assumed down, calls fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: next call after reset_timeout has elapsed since the last failure
//! Half-Open → Closed: probe call succeeds, or half_open_timeout passes without a failure
//! Half-Open → Open: probe call fails (regardless of threshold)
//! ```
//!
//! # Design Decisions
//! - Per-backend circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Single probe in Half-Open (prevents hammering recovering backend)
//! - The half-open recovery timer is a deadline checked under the breaker's
//!   lock, so there is no detached task to own or cancel

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::observability::metrics;

/// Breaker state as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "CLOSED",
            BreakerState::Open => "OPEN",
            BreakerState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds and timeouts for one breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures (while closed) that open the circuit.
    pub failure_threshold: u32,
    /// Time since the last failure before an open circuit admits a probe.
    pub reset_timeout: Duration,
    /// Time a half-open circuit waits before closing on its own.
    pub half_open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(10),
            half_open_timeout: Duration::from_secs(5),
        }
    }
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The call was rejected without running the operation.
    #[error("Circuit breaker for {backend} is OPEN")]
    Open { backend: String },

    /// The operation ran and failed.
    #[error("{0}")]
    Inner(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    /// Half-open trial call, tagged with its generation.
    Probe(u64),
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    half_open_deadline: Option<Instant>,
    probe_in_flight: bool,
    probe_generation: u64,
}

/// Health gate for a single backend.
#[derive(Debug)]
pub struct CircuitBreaker {
    backend: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(backend: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let backend = backend.into();
        metrics::set_breaker_state(&backend, BreakerState::Closed);
        Self {
            backend,
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
                half_open_deadline: None,
                probe_in_flight: false,
                probe_generation: 0,
            }),
        }
    }

    /// Name of the backend this breaker guards.
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Current state, after applying any elapsed half-open deadline.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        self.expire_half_open(&mut inner, Instant::now());
        inner.state
    }

    pub fn failure_count(&self) -> u32 {
        let mut inner = self.lock();
        self.expire_half_open(&mut inner, Instant::now());
        inner.failure_count
    }

    /// Run `operation` through the breaker.
    ///
    /// Rejects with [`BreakerError::Open`] without running `operation` while
    /// the circuit is open. Otherwise runs it exactly once, records the
    /// outcome and passes the operation's own error through.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(admission) = self.try_acquire() else {
            tracing::debug!(backend = %self.backend, "Circuit open, rejecting call");
            return Err(BreakerError::Open {
                backend: self.backend.clone(),
            });
        };

        match operation().await {
            Ok(value) => {
                self.on_success(admission);
                Ok(value)
            }
            Err(e) => {
                self.on_failure(admission);
                Err(BreakerError::Inner(e))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_acquire(&self) -> Option<Admission> {
        let now = Instant::now();
        let mut inner = self.lock();
        self.expire_half_open(&mut inner, now);

        match inner.state {
            BreakerState::Closed => Some(Admission::Normal),
            BreakerState::Open => {
                let since_failure = inner
                    .last_failure
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(Duration::MAX);
                if since_failure > self.config.reset_timeout {
                    inner.half_open_deadline = Some(now + self.config.half_open_timeout);
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    Some(Self::begin_probe(&mut inner))
                } else {
                    None
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    None
                } else {
                    Some(Self::begin_probe(&mut inner))
                }
            }
        }
    }

    fn begin_probe(inner: &mut BreakerInner) -> Admission {
        inner.probe_generation += 1;
        inner.probe_in_flight = true;
        Admission::Probe(inner.probe_generation)
    }

    /// Whether the outcome of `admission` may move the breaker.
    ///
    /// While half-open only the current probe counts. Calls admitted earlier,
    /// including probes that outlived a passive close, are ignored.
    fn settle(inner: &mut BreakerInner, admission: Admission) -> bool {
        if inner.state != BreakerState::HalfOpen {
            return true;
        }
        if admission == Admission::Probe(inner.probe_generation) {
            inner.probe_in_flight = false;
            true
        } else {
            false
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut inner = self.lock();
        self.expire_half_open(&mut inner, Instant::now());
        if !Self::settle(&mut inner, admission) {
            return;
        }

        match inner.state {
            BreakerState::Closed => inner.failure_count = 0,
            BreakerState::HalfOpen => {
                inner.failure_count = 0;
                self.transition(&mut inner, BreakerState::Closed);
            }
            // Another call reopened the circuit while this one was running.
            BreakerState::Open => {}
        }
    }

    fn on_failure(&self, admission: Admission) {
        let now = Instant::now();
        let mut inner = self.lock();
        self.expire_half_open(&mut inner, now);
        if !Self::settle(&mut inner, admission) {
            return;
        }

        match inner.state {
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.last_failure = Some(now);
                    self.transition(&mut inner, BreakerState::Open);
                }
            }
            BreakerState::HalfOpen => {
                inner.failure_count += 1;
                inner.last_failure = Some(now);
                self.transition(&mut inner, BreakerState::Open);
            }
            BreakerState::Open => {}
        }
    }

    /// Passive recovery: a half-open circuit whose deadline passed closes.
    fn expire_half_open(&self, inner: &mut BreakerInner, now: Instant) {
        if inner.state != BreakerState::HalfOpen {
            return;
        }
        if inner.half_open_deadline.is_some_and(|deadline| now >= deadline) {
            inner.failure_count = 0;
            inner.probe_in_flight = false;
            self.transition(inner, BreakerState::Closed);
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: BreakerState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        if to != BreakerState::HalfOpen {
            inner.half_open_deadline = None;
        }

        match to {
            BreakerState::Open => tracing::warn!(
                backend = %self.backend,
                from = %from,
                failures = inner.failure_count,
                "Circuit breaker opened"
            ),
            _ => tracing::info!(
                backend = %self.backend,
                from = %from,
                to = %to,
                "Circuit breaker state changed"
            ),
        }
        metrics::set_breaker_state(&self.backend, to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "test-backend",
            CircuitBreakerConfig {
                failure_threshold: 3,
                reset_timeout: Duration::from_millis(10_000),
                half_open_timeout: Duration::from_millis(5_000),
            },
        )
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        cb.call(|| async { Err("Failed") }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<&'static str, BreakerError<&'static str>> {
        cb.call(|| async { Ok("success") }).await
    }

    async fn open(cb: &CircuitBreaker) {
        for _ in 0..3 {
            assert!(matches!(fail(cb).await, Err(BreakerError::Inner("Failed"))));
        }
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_initial_state() {
        let cb = breaker();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(succeed(&cb).await.unwrap(), "success");
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_opens_exactly_at_threshold() {
        let cb = breaker();

        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), BreakerState::Closed);
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.failure_count(), 2);

        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), BreakerState::Open);
        assert_eq!(cb.failure_count(), 3);
    }

    #[tokio::test]
    async fn test_success_resets_failures_while_closed() {
        let cb = breaker();
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        succeed(&cb).await.unwrap();
        assert_eq!(cb.failure_count(), 0);

        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_without_invoking_when_open() {
        let cb = breaker();
        open(&cb).await;

        let mut invoked = false;
        let result = cb
            .call(|| {
                invoked = true;
                async { Ok::<_, &str>(()) }
            })
            .await;

        assert!(matches!(result, Err(BreakerError::Open { .. })));
        assert!(!invoked);
        assert_eq!(
            result.unwrap_err().to_string(),
            "Circuit breaker for test-backend is OPEN"
        );

        // Exactly at the reset timeout the circuit is still open.
        tokio::time::advance(Duration::from_millis(10_000)).await;
        assert!(matches!(succeed(&cb).await, Err(BreakerError::Open { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_success_closes() {
        let cb = breaker();
        open(&cb).await;
        tokio::time::advance(Duration::from_millis(10_001)).await;

        let state_during_probe = cb
            .call(|| async { Ok::<_, &str>(cb.state()) })
            .await
            .unwrap();
        assert_eq!(state_during_probe, BreakerState::HalfOpen);
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_failure_reopens() {
        let cb = CircuitBreaker::new(
            "test-backend",
            CircuitBreakerConfig {
                failure_threshold: 10,
                ..breaker().config
            },
        );
        for _ in 0..10 {
            fail(&cb).await.unwrap_err();
        }
        assert_eq!(cb.state(), BreakerState::Open);
        tokio::time::advance(Duration::from_millis(10_001)).await;

        // A single half-open failure reopens regardless of the threshold.
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(matches!(succeed(&cb).await, Err(BreakerError::Open { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_probe_in_flight() {
        let cb = breaker();
        open(&cb).await;
        tokio::time::advance(Duration::from_millis(10_001)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let probe = cb.call(|| async move {
            let _ = release_rx.await;
            Ok::<_, &str>("probe")
        });
        tokio::pin!(probe);

        // Drive the probe until it parks on the channel.
        assert!(futures_util::poll!(probe.as_mut()).is_pending());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(matches!(succeed(&cb).await, Err(BreakerError::Open { .. })));

        release_tx.send(()).unwrap();
        assert_eq!(probe.await.unwrap(), "probe");
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_probe_does_not_release_newer_probe() {
        let cb = breaker();
        open(&cb).await;
        tokio::time::advance(Duration::from_millis(10_001)).await;

        let (first_tx, first_rx) = tokio::sync::oneshot::channel::<()>();
        let first = cb.call(|| async move {
            let _ = first_rx.await;
            Ok::<_, &str>("first")
        });
        tokio::pin!(first);
        assert!(futures_util::poll!(first.as_mut()).is_pending());

        // Passive close, then reopen and admit a second probe.
        tokio::time::advance(Duration::from_millis(5_000)).await;
        assert_eq!(cb.state(), BreakerState::Closed);
        open(&cb).await;
        tokio::time::advance(Duration::from_millis(10_001)).await;

        let (second_tx, second_rx) = tokio::sync::oneshot::channel::<()>();
        let second = cb.call(|| async move {
            let _ = second_rx.await;
            Ok::<_, &str>("second")
        });
        tokio::pin!(second);
        assert!(futures_util::poll!(second.as_mut()).is_pending());

        first_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap(), "first");
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(matches!(succeed(&cb).await, Err(BreakerError::Open { .. })));

        second_tx.send(()).unwrap();
        assert_eq!(second.await.unwrap(), "second");
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_closes_passively_after_timeout() {
        let cb = breaker();
        open(&cb).await;
        tokio::time::advance(Duration::from_millis(10_001)).await;

        let (_release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let probe = cb.call(|| async move {
            let _ = release_rx.await;
            Ok::<_, &str>(())
        });
        tokio::pin!(probe);
        assert!(futures_util::poll!(probe.as_mut()).is_pending());
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        tokio::time::advance(Duration::from_millis(5_000)).await;
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(succeed(&cb).await.unwrap(), "success");
    }
}
