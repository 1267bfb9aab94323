//! Simulated transport with random failures and latency.

use std::ops::RangeInclusive;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::backends::{BackendError, EmailBackend};
use crate::config::BackendConfig;

/// Stand-in for a real provider: fails with probability `failure_rate`
/// after a uniformly drawn network delay.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    name: String,
    failure_rate: f64,
    latency_ms: RangeInclusive<u64>,
}

impl SimulatedBackend {
    pub fn new(name: impl Into<String>, failure_rate: f64, latency_ms: RangeInclusive<u64>) -> Self {
        Self {
            name: name.into(),
            failure_rate: failure_rate.clamp(0.0, 1.0),
            latency_ms,
        }
    }

    /// The default primary provider (30% failures, 100-300ms).
    pub fn provider_a() -> Self {
        Self::new("MockProviderA", 0.3, 100..=300)
    }

    /// The default secondary provider (10% failures, 150-450ms).
    pub fn provider_b() -> Self {
        Self::new("MockProviderB", 0.1, 150..=450)
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.failure_rate,
            config.min_latency_ms..=config.max_latency_ms,
        )
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }
}

#[async_trait]
impl EmailBackend for SimulatedBackend {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<bool, BackendError> {
        // ThreadRng is not Send; draw everything before the first await.
        let (should_fail, delay) = {
            let mut rng = rand::thread_rng();
            let should_fail = rng.gen_bool(self.failure_rate);
            let delay = if self.latency_ms.is_empty() {
                *self.latency_ms.start()
            } else {
                rng.gen_range(self.latency_ms.clone())
            };
            (should_fail, Duration::from_millis(delay))
        };

        tokio::time::sleep(delay).await;

        if should_fail {
            tracing::debug!(backend = %self.name, to, delay = ?delay, "Simulated transport failure");
            return Err(BackendError::Transport {
                backend: self.name.clone(),
                recipient: to.to_owned(),
            });
        }

        tracing::info!(backend = %self.name, to, subject, "Email sent");
        Ok(true)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
