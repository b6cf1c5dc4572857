//! Retry of whole units of work after a concurrency conflict

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::SettlementConfig;
use crate::error::SettlementError;

/// Bounded exponential backoff for [`SettlementError::ConcurrencyConflict`]
///
/// The operation is re-run from scratch, including its reads, so every attempt
/// sees the state left by whichever writer won the race.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &SettlementConfig) -> Self {
        Self::new(
            config.conflict_retry_attempts,
            config.conflict_retry_base_delay,
            config.conflict_retry_base_delay.saturating_mul(16),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the given attempt (0-indexed); the first attempt never waits
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let multiplier = 2u32.saturating_pow(attempt - 1);
        std::cmp::min(self.base_delay.saturating_mul(multiplier), self.max_delay)
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or runs out of attempts
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, SettlementError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SettlementError>>,
    {
        let mut attempt = 0;
        loop {
            let delay = self.delay_for_attempt(attempt);
            if !delay.is_zero() {
                debug!(attempt, ?delay, "Retrying after delay");
                sleep(delay).await;
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Concurrency conflict, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SettlementConfig::default())
    }
}
