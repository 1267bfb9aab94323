//! The dispatcher: idempotency, admission, and primary/secondary delivery.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use futures_util::FutureExt;
use uuid::Uuid;

use crate::backends::EmailBackend;
use crate::config::DispatchConfig;
use crate::dispatch::types::{SendRequest, SendResult};
use crate::dispatch::DispatchError;
use crate::observability::metrics;
use crate::resilience::{
    BreakerError, BreakerState, CircuitBreaker, CircuitBreakerConfig, IdempotencyTracker,
    RateLimiter, Retried, RetryPolicy,
};

/// Construction-time settings for [`EmailService`].
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub max_requests_per_window: usize,
    pub window: Duration,
    /// Give up waiting for admission after this many rounds (`None` = never).
    pub max_wait_rounds: Option<u32>,
    /// Attempts per backend, including the first.
    pub max_retries: u32,
    pub base_retry_delay: Duration,
    pub breaker: CircuitBreakerConfig,
    pub idempotency_ttl: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_requests_per_window: 10,
            window: Duration::from_secs(60),
            max_wait_rounds: None,
            max_retries: 3,
            base_retry_delay: Duration::from_secs(1),
            breaker: CircuitBreakerConfig::default(),
            idempotency_ttl: Duration::from_secs(60 * 60),
        }
    }
}

impl DispatchSettings {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            max_requests_per_window: config.rate_limit.max_requests,
            window: Duration::from_millis(config.rate_limit.window_ms),
            max_wait_rounds: config.rate_limit.max_wait_rounds,
            max_retries: config.retries.max_attempts,
            base_retry_delay: Duration::from_millis(config.retries.base_delay_ms),
            breaker: CircuitBreakerConfig {
                failure_threshold: config.circuit_breaker.failure_threshold,
                reset_timeout: Duration::from_millis(config.circuit_breaker.reset_timeout_ms),
                half_open_timeout: Duration::from_millis(
                    config.circuit_breaker.half_open_timeout_ms,
                ),
            },
            idempotency_ttl: Duration::from_secs(config.idempotency.ttl_secs),
        }
    }
}

/// A backend paired with the breaker registered under its name.
struct Route {
    backend: Arc<dyn EmailBackend>,
    breaker: Arc<CircuitBreaker>,
}

/// Resilient dispatcher over a primary and a secondary backend.
///
/// Shared state (rate limiter, idempotency set, tracking table, breakers)
/// is guarded per component, so concurrent `send` calls only contend on the
/// short critical sections inside each one.
pub struct EmailService {
    primary: Route,
    secondary: Route,
    breakers: HashMap<String, Arc<CircuitBreaker>>,
    rate_limiter: RateLimiter,
    idempotency: Arc<IdempotencyTracker>,
    tracking: DashMap<String, SendResult>,
    retry: RetryPolicy,
}

impl EmailService {
    pub fn new(
        primary: Arc<dyn EmailBackend>,
        secondary: Arc<dyn EmailBackend>,
        settings: DispatchSettings,
    ) -> Self {
        let mut breakers: HashMap<String, Arc<CircuitBreaker>> = HashMap::new();
        let mut route = |backend: Arc<dyn EmailBackend>| {
            let breaker = breakers
                .entry(backend.name().to_owned())
                .or_insert_with(|| {
                    Arc::new(CircuitBreaker::new(backend.name(), settings.breaker.clone()))
                })
                .clone();
            Route { backend, breaker }
        };
        let primary = route(primary);
        let secondary = route(secondary);

        tracing::info!(
            primary = primary.backend.name(),
            secondary = secondary.backend.name(),
            max_requests = settings.max_requests_per_window,
            window = ?settings.window,
            max_retries = settings.max_retries,
            "Dispatcher initialized"
        );

        Self {
            primary,
            secondary,
            breakers,
            rate_limiter: RateLimiter::new(settings.max_requests_per_window, settings.window)
                .with_max_wait_rounds(settings.max_wait_rounds),
            idempotency: Arc::new(IdempotencyTracker::new(settings.idempotency_ttl)),
            tracking: DashMap::new(),
            retry: RetryPolicy::new(settings.max_retries, settings.base_retry_delay),
        }
    }

    /// Dispatch `request`, falling back to the secondary backend once.
    ///
    /// Never fails: every outcome, including backend errors and an open
    /// circuit, is reported as a [`SendResult`]. Once admitted past the
    /// idempotency check the pipeline runs on its own task, so dropping the
    /// returned future does not stop delivery or leave the entry PENDING.
    pub async fn send(self: &Arc<Self>, request: SendRequest) -> SendResult {
        let tracking_id = match request.idempotency_key.as_deref() {
            Some(key) if !key.is_empty() => key.to_owned(),
            _ => synthesize_tracking_id(&request.recipient),
        };

        if self.idempotency.check_and_add(&tracking_id) {
            metrics::record_duplicate();
            tracing::info!(tracking_id = %tracking_id, "Duplicate request detected, not resending");
            return self
                .get_status(&tracking_id)
                .unwrap_or_else(|| SendResult::duplicate(&tracking_id));
        }

        self.tracking
            .insert(tracking_id.clone(), SendResult::pending(&tracking_id));

        let service = Arc::clone(self);
        let id = tracking_id.clone();
        let pipeline = tokio::spawn(async move { service.run_pipeline(id, request).await });

        match pipeline.await {
            Ok(result) => result,
            // The runtime is shutting down; the pipeline never finished.
            Err(e) => {
                tracing::error!(tracking_id = %tracking_id, error = %e, "Dispatch task aborted");
                let result = SendResult::failed(
                    &tracking_id,
                    "Dispatch task aborted",
                    "",
                    self.retry.max_attempts(),
                );
                self.tracking.insert(tracking_id, result.clone());
                result
            }
        }
    }

    /// Latest known result for `tracking_id`.
    pub fn get_status(&self, tracking_id: &str) -> Option<SendResult> {
        self.tracking.get(tracking_id).map(|entry| entry.value().clone())
    }

    /// State of the breaker guarding backend `name`.
    pub fn get_breaker_status(&self, name: &str) -> Option<BreakerState> {
        self.breakers.get(name).map(|breaker| breaker.state())
    }

    /// All breakers and their states, sorted by backend name.
    pub fn breaker_states(&self) -> Vec<(String, BreakerState)> {
        let mut states: Vec<_> = self
            .breakers
            .values()
            .map(|breaker| (breaker.backend().to_owned(), breaker.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    pub fn breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).cloned()
    }

    pub fn idempotency(&self) -> &Arc<IdempotencyTracker> {
        &self.idempotency
    }

    /// Deliver and record the terminal result for `tracking_id`.
    async fn run_pipeline(&self, tracking_id: String, request: SendRequest) -> SendResult {
        let outcome = AssertUnwindSafe(self.deliver(&tracking_id, &request))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(DispatchError::Panicked(panic_message(panic))));

        let result = match outcome {
            Ok(result) => result,
            Err(DispatchError::RateLimited(e)) => {
                SendResult::rate_limited(&tracking_id, e.to_string())
            }
            Err(e) => {
                tracing::error!(tracking_id = %tracking_id, error = %e, "Dispatch pipeline failed");
                SendResult::failed(&tracking_id, e.to_string(), "", self.retry.max_attempts())
            }
        };

        tracing::info!(
            tracking_id = %tracking_id,
            status = result.status.as_str(),
            backend = %result.backend_used,
            retries = result.retry_count,
            "Dispatch finished"
        );
        metrics::record_request(result.status);
        self.tracking.insert(tracking_id, result.clone());
        result
    }

    async fn deliver(&self, tracking_id: &str, request: &SendRequest) -> Result<SendResult, DispatchError> {
        self.rate_limiter.check().await?;

        let primary = self.attempt(&self.primary, tracking_id, request).await;
        if primary.success {
            return Ok(primary);
        }

        tracing::warn!(
            tracking_id,
            primary = %primary.backend_used,
            reason = %primary.message,
            secondary = self.secondary.backend.name(),
            "Primary backend failed, falling back"
        );
        metrics::record_fallback();
        Ok(self.attempt(&self.secondary, tracking_id, request).await)
    }

    /// One breaker-guarded, retried delivery attempt against `route`.
    async fn attempt(&self, route: &Route, tracking_id: &str, request: &SendRequest) -> SendResult {
        let backend = &route.backend;
        let name = backend.name();

        let outcome = route
            .breaker
            .call(|| {
                self.retry.run(|| {
                    backend.send(&request.recipient, &request.subject, &request.body)
                })
            })
            .await;

        let result = match outcome {
            Ok(Retried {
                value: true,
                attempts,
            }) => SendResult::sent(tracking_id, name, attempts.saturating_sub(1)),
            Ok(Retried {
                value: false,
                attempts,
            }) => SendResult::failed(
                tracking_id,
                format!("Failed after {attempts} attempts"),
                name,
                attempts.saturating_sub(1),
            ),
            Err(e @ BreakerError::Open { .. }) => {
                SendResult::failed(tracking_id, e.to_string(), name, 0)
            }
            Err(BreakerError::Inner(e)) => SendResult::failed(
                tracking_id,
                e.to_string(),
                name,
                e.attempts().saturating_sub(1),
            ),
        };

        metrics::record_backend_attempt(name, result.status.as_str());
        result
    }
}

/// Fallback key for requests without an idempotency key.
///
/// Unique per call, so such requests are never deduplicated.
fn synthesize_tracking_id(recipient: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{}-{}-{}", recipient, millis, Uuid::new_v4().simple())
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "Unknown error occurred".to_owned()
    }
}
