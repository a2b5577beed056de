//! Bounded retry with exponential backoff for transient failures.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::{GenerationError, GenerationService};
use crate::config::GenerationSettings;
use crate::prompt::GenerationRequest;

/// Retries `Timeout` and `QuotaExceeded` up to `max_retries` times, sleeping
/// `backoff_base * 2^n` before retry `n`. Every other failure is returned at
/// once.
pub struct RetryingClient {
    inner: Box<dyn GenerationService>,
    max_retries: u32,
    backoff_base: Duration,
}

impl RetryingClient {
    pub fn new(inner: Box<dyn GenerationService>, max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            inner,
            max_retries,
            backoff_base,
        }
    }

    pub fn from_settings(inner: Box<dyn GenerationService>, settings: &GenerationSettings) -> Self {
        Self::new(
            inner,
            settings.max_retries,
            Duration::from_millis(settings.backoff_base_ms),
        )
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        self.backoff_base.saturating_mul(1u32 << retry.min(16))
    }
}

#[async_trait]
impl GenerationService for RetryingClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let mut retry = 0;
        loop {
            let started = Instant::now();
            let result = self.inner.generate(request).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(text) => {
                    info!(
                        provider = self.inner.name(),
                        skill = %request.skill_id,
                        variant = %request.variant,
                        attempt = retry + 1,
                        latency_ms,
                        "generation succeeded"
                    );
                    return Ok(text);
                }
                Err(err) if err.is_transient() && retry < self.max_retries => {
                    let delay = self.backoff(retry);
                    warn!(
                        provider = self.inner.name(),
                        skill = %request.skill_id,
                        attempt = retry + 1,
                        latency_ms,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient generation failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(err) => {
                    warn!(
                        provider = self.inner.name(),
                        skill = %request.skill_id,
                        attempt = retry + 1,
                        latency_ms,
                        error = %err,
                        "generation failed"
                    );
                    return Err(err);
                }
            }
        }
    }
}
