//! Resilient email dispatch orchestrator.
//!
//! Sends each request through an idempotency gate and a sliding-window rate
//! limiter, then to a primary backend guarded by a circuit breaker and a
//! retry policy, falling back once to a secondary backend.

// Core
pub mod backends;
pub mod dispatch;
pub mod resilience;

// Surfaces and cross-cutting concerns
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use backends::{BackendError, EmailBackend, SimulatedBackend};
pub use config::DispatchConfig;
pub use dispatch::{DeliveryStatus, DispatchSettings, EmailService, SendRequest, SendResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resilience::BreakerState;
