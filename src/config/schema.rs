//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the dispatcher.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the dispatch service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DispatchConfig {
    /// HTTP front-end settings.
    pub server: ServerConfig,

    /// Outbound admission window.
    pub rate_limit: RateLimitConfig,

    /// Per-backend retry policy.
    pub retries: RetryConfig,

    /// Per-backend circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerSettings,

    /// Duplicate suppression.
    pub idempotency: IdempotencyConfig,

    /// Primary and secondary backends.
    pub backends: BackendsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// HTTP front-end configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Request timeout in seconds. Covers the whole batch, including rate limit waits.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            request_timeout_secs: 120,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum dispatches admitted per window.
    pub max_requests: usize,

    /// Window length in milliseconds.
    pub window_ms: u64,

    /// Give up after this many waits. Absent means wait indefinitely.
    pub max_wait_rounds: Option<u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_ms: 60_000,
            max_wait_rounds: None,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per backend, including the first. Must be at least 1.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

/// Circuit breaker configuration, applied to every backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub half_open_timeout_ms: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_ms: 10_000,
            half_open_timeout_ms: 5_000,
        }
    }
}

/// Idempotency configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// How long a key suppresses duplicates, in seconds.
    pub ttl_secs: u64,

    /// How often expired keys are swept, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 60 * 60,
            sweep_interval_secs: 60,
        }
    }
}

/// The two interchangeable backends.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendsConfig {
    pub primary: BackendConfig,
    pub secondary: BackendConfig,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            primary: BackendConfig {
                name: "MockProviderA".to_string(),
                failure_rate: 0.3,
                min_latency_ms: 100,
                max_latency_ms: 300,
            },
            secondary: BackendConfig {
                name: "MockProviderB".to_string(),
                failure_rate: 0.1,
                min_latency_ms: 150,
                max_latency_ms: 450,
            },
        }
    }
}

/// Simulated backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Unique backend identifier; also names its circuit breaker.
    pub name: String,

    /// Probability in [0, 1] that a send fails.
    #[serde(default)]
    pub failure_rate: f64,

    #[serde(default = "default_min_latency_ms")]
    pub min_latency_ms: u64,

    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: u64,
}

fn default_min_latency_ms() -> u64 {
    100
}

fn default_max_latency_ms() -> u64 {
    300
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
