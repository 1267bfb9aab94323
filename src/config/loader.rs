//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::DispatchConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<DispatchConfig, ConfigError> {
    let config: DispatchConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<DispatchConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.backends.primary.name, "MockProviderA");
    }

    #[test]
    fn test_partial_sections() {
        let config = parse_config(
            r#"
            [rate_limit]
            max_requests = 5
            window_ms = 10000

            [retries]
            base_delay_ms = 50

            [backends.primary]
            name = "smtp-relay"
            failure_rate = 0.0

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.max_wait_rounds, None);
        assert_eq!(config.retries.max_attempts, 3);
        assert_eq!(config.retries.base_delay_ms, 50);
        assert_eq!(config.backends.primary.name, "smtp-relay");
        assert_eq!(config.backends.primary.max_latency_ms, 300);
        assert_eq!(config.backends.secondary.name, "MockProviderB");
        assert_eq!(
            config.observability.log_format,
            crate::config::schema::LogFormat::Json
        );
    }

    #[test]
    fn test_validation_errors_are_joined() {
        let err = parse_config("[retries]\nmax_attempts = 0\n[rate_limit]\nwindow_ms = 0\n")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: rate_limit.window_ms must be greater than zero, \
             retries.max_attempts must be greater than zero"
        );
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(parse_config("[rate_limit"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
