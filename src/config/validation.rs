//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, probabilities in [0, 1])
//! - Check addresses parse before anything binds them
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DispatchConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{BackendConfig, DispatchConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} is not a valid socket address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: {reason}")]
    InvalidBackend { field: &'static str, reason: String },
}

pub fn validate_config(config: &DispatchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let nonzero = [
        ("rate_limit.max_requests", config.rate_limit.max_requests as u64),
        ("rate_limit.window_ms", config.rate_limit.window_ms),
        ("retries.max_attempts", u64::from(config.retries.max_attempts)),
        (
            "circuit_breaker.failure_threshold",
            u64::from(config.circuit_breaker.failure_threshold),
        ),
        ("idempotency.ttl_secs", config.idempotency.ttl_secs),
        ("idempotency.sweep_interval_secs", config.idempotency.sweep_interval_secs),
        ("server.request_timeout_secs", config.server.request_timeout_secs),
    ];
    for (field, value) in nonzero {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    check_address(&mut errors, "server.bind_address", &config.server.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    check_backend(&mut errors, "backends.primary", &config.backends.primary);
    check_backend(&mut errors, "backends.secondary", &config.backends.secondary);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_backend(errors: &mut Vec<ValidationError>, field: &'static str, backend: &BackendConfig) {
    let mut invalid = |reason: String| errors.push(ValidationError::InvalidBackend { field, reason });

    if backend.name.trim().is_empty() {
        invalid("name must not be empty".to_string());
    }
    if !(0.0..=1.0).contains(&backend.failure_rate) {
        invalid(format!("failure_rate {} is outside [0, 1]", backend.failure_rate));
    }
    if backend.min_latency_ms > backend.max_latency_ms {
        invalid(format!(
            "min_latency_ms {} exceeds max_latency_ms {}",
            backend.min_latency_ms, backend.max_latency_ms
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&DispatchConfig::default()), Ok(()));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = DispatchConfig::default();
        config.retries.max_attempts = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::Zero {
                field: "retries.max_attempts"
            }]
        );
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = DispatchConfig::default();
        config.rate_limit.max_requests = 0;
        config.server.bind_address = "not-an-address".to_string();
        config.backends.secondary.failure_rate = f64::NAN;
        config.backends.secondary.min_latency_ms = 500;
        config.backends.primary.name = " ".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::Zero {
            field: "rate_limit.max_requests"
        }));
        assert_eq!(
            errors[1].to_string(),
            "server.bind_address is not a valid socket address: not-an-address"
        );
    }

    #[test]
    fn test_metrics_address_only_checked_when_enabled() {
        let mut config = DispatchConfig::default();
        config.observability.metrics_address = "nowhere".to_string();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
