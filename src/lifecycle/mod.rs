//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Logging/metrics → Dispatcher → Sweeper → Listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received (signals.rs) → broadcast → server drains, sweeper exits
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
