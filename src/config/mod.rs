//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DispatchConfig (validated, immutable)
//!     → DispatchSettings handed to the dispatcher; server/observability sections to the binary
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - The dispatcher never reads files or the environment itself

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BackendConfig, BackendsConfig, CircuitBreakerSettings, DispatchConfig, IdempotencyConfig,
    LogFormat, ObservabilityConfig, RateLimitConfig, RetryConfig, ServerConfig,
};
pub use validation::{validate_config, ValidationError};
