//! Shared utilities for dispatch integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use email_dispatch::backends::{BackendError, EmailBackend};
use email_dispatch::dispatch::{DispatchSettings, EmailService};
use email_dispatch::resilience::CircuitBreakerConfig;

/// What a [`ScriptedBackend`] does on each call.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    AlwaysOk,
    AlwaysFail,
    /// Fail the first `n` calls, then succeed.
    FailTimes(u32),
    /// Answer `Ok(false)`.
    Reject,
    Panic,
}

/// Deterministic backend that counts its calls.
pub struct ScriptedBackend {
    name: String,
    behavior: Behavior,
    latency: Duration,
    calls: AtomicU32,
}

impl ScriptedBackend {
    pub fn new(name: &str, behavior: Behavior) -> Arc<Self> {
        Self::with_latency(name, behavior, Duration::ZERO)
    }

    pub fn with_latency(name: &str, behavior: Behavior, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            latency,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmailBackend for ScriptedBackend {
    async fn send(&self, to: &str, _subject: &str, _body: &str) -> Result<bool, BackendError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let fail = match self.behavior {
            Behavior::AlwaysOk => false,
            Behavior::AlwaysFail => true,
            Behavior::FailTimes(n) => call < n,
            Behavior::Reject => return Ok(false),
            Behavior::Panic => panic!("{} exploded", self.name),
        };

        if fail {
            Err(BackendError::Transport {
                backend: self.name.clone(),
                recipient: to.to_string(),
            })
        } else {
            Ok(true)
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Settings with generous limits and a 1s retry base.
pub fn test_settings() -> DispatchSettings {
    DispatchSettings {
        max_requests_per_window: 100,
        window: Duration::from_secs(60),
        max_wait_rounds: None,
        max_retries: 3,
        base_retry_delay: Duration::from_secs(1),
        breaker: CircuitBreakerConfig::default(),
        idempotency_ttl: Duration::from_secs(3600),
    }
}

pub fn service(
    primary: &Arc<ScriptedBackend>,
    secondary: &Arc<ScriptedBackend>,
    settings: DispatchSettings,
) -> Arc<EmailService> {
    Arc::new(EmailService::new(
        primary.clone(),
        secondary.clone(),
        settings,
    ))
}
