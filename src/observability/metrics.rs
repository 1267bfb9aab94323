//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatch_requests_total` (counter): finished dispatches by status
//! - `dispatch_duplicates_total` (counter): requests suppressed by idempotency
//! - `dispatch_backend_attempts_total` (counter): per-backend outcomes
//! - `dispatch_fallbacks_total` (counter): primary failures handed to the secondary
//! - `dispatch_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `dispatch_rate_limit_wait_seconds` (histogram): admission wait time
//! - `dispatch_idempotency_keys` (gauge): keys currently tracked
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::dispatch::DeliveryStatus;
use crate::resilience::BreakerState;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(status: DeliveryStatus) {
    counter!("dispatch_requests_total", "status" => status.as_str()).increment(1);
}

pub fn record_duplicate() {
    counter!("dispatch_duplicates_total").increment(1);
}

pub fn record_backend_attempt(backend: &str, outcome: &'static str) {
    counter!(
        "dispatch_backend_attempts_total",
        "backend" => backend.to_owned(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_fallback() {
    counter!("dispatch_fallbacks_total").increment(1);
}

pub fn set_breaker_state(backend: &str, state: BreakerState) {
    let value = match state {
        BreakerState::Closed => 0.0,
        BreakerState::HalfOpen => 1.0,
        BreakerState::Open => 2.0,
    };
    gauge!("dispatch_breaker_state", "backend" => backend.to_owned()).set(value);
}

pub fn record_rate_limit_wait(waited: Duration) {
    histogram!("dispatch_rate_limit_wait_seconds").record(waited.as_secs_f64());
}

pub fn set_idempotency_keys(count: usize) {
    gauge!("dispatch_idempotency_keys").set(count as f64);
}
