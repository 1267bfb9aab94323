//! Delivery backends.
//!
//! # Responsibilities
//! - Define the capability every transport exposes to the dispatcher
//! - Provide simulated transports for demos and tests
//!
//! # Design Decisions
//! - Backends are trait objects (`Arc<dyn EmailBackend>`), injected at construction
//! - `name()` is stable and keys the per-backend circuit breaker
//! - `Ok(false)` is a soft rejection; `Err` is a transport failure and is retried

pub mod simulated;

use async_trait::async_trait;
use thiserror::Error;

pub use simulated::SimulatedBackend;

/// Failure of a single backend attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("{backend} failed to send email to {recipient}")]
    Transport { backend: String, recipient: String },
}

/// A transport that can deliver one message.
#[async_trait]
pub trait EmailBackend: Send + Sync {
    /// Attempt delivery; `Ok(true)` means the message was accepted.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<bool, BackendError>;

    fn name(&self) -> &str;
}
