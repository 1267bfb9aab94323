//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch request:
//!     → idempotency.rs (drop duplicates before any backend call)
//!     → rate_limit.rs (suspend until the sliding window has room)
//!     → circuit_breaker.rs (fail fast while a backend is unhealthy)
//!         → retries.rs (retry the backend call with backoff.rs delays)
//! ```
//!
//! # Design Decisions
//! - Each component owns its own lock; nothing serializes a whole dispatch
//! - Timers are deadlines checked under those locks, not detached callbacks
//! - All timing goes through `tokio::time` so tests can pause the clock

pub mod backoff;
pub mod circuit_breaker;
pub mod idempotency;
pub mod rate_limit;
pub mod retries;

pub use circuit_breaker::{BreakerError, BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use idempotency::IdempotencyTracker;
pub use rate_limit::{RateLimitError, RateLimiter};
pub use retries::{with_retry, Retried, RetryError, RetryPolicy};
