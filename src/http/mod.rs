//! HTTP front-end.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, tracing, timeout)
//!     → handlers.rs (decode JSON, call EmailService, encode results)
//! ```

pub mod handlers;
pub mod server;

pub use server::{build_router, AppState, HttpServer};
