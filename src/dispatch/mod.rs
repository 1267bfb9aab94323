//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! SendRequest
//!     → service.rs: derive tracking id
//!     → IdempotencyTracker (duplicate? return stored result)
//!     → tracking table ← PENDING
//!     → RateLimiter (suspend until admitted)
//!     → primary:   CircuitBreaker → RetryPolicy → backend.send
//!     → secondary: CircuitBreaker → RetryPolicy → backend.send (only if primary failed)
//!     → tracking table ← SENT | FAILED | RATE_LIMITED
//! ```
//!
//! # Design Decisions
//! - Backend, breaker and retry failures become results, never errors
//! - Fallback happens at most once per send
//! - Only unexpected failures (admission give-up, panics) reach `DispatchError`

pub mod service;
pub mod types;

use thiserror::Error;

use crate::resilience::RateLimitError;

pub use service::{DispatchSettings, EmailService};
pub use types::{DeliveryStatus, SendRequest, SendResult};

/// Failures that escape the delivery pipeline.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error("{0}")]
    Panicked(String),
}
