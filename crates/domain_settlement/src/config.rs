//! Settlement engine configuration

use std::time::Duration;

use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::{Currency, Percentage};

/// Tunables for the settlement service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Cap on advance deduction as a share of net-after-commission
    pub default_deduction_cap: Percentage,
    /// Lookback window used when a caller omits the date range
    pub default_range_days: u64,
    /// Upper bound on each post-commit dispatch step
    pub dispatch_timeout: Duration,
    /// Attempts for an operation that loses a concurrency race
    pub conflict_retry_attempts: u32,
    /// Delay before the first retry; doubles on each further attempt
    pub conflict_retry_base_delay: Duration,
    pub currency: Currency,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            default_deduction_cap: Percentage::new(dec!(20)).unwrap_or(Percentage::ZERO),
            default_range_days: 15,
            dispatch_timeout: Duration::from_secs(10),
            conflict_retry_attempts: 3,
            conflict_retry_base_delay: Duration::from_millis(25),
            currency: Currency::INR,
        }
    }
}

impl SettlementConfig {
    /// Configuration with dispatch and retry delays shortened for tests
    pub fn testing() -> Self {
        Self {
            dispatch_timeout: Duration::from_millis(200),
            conflict_retry_base_delay: Duration::from_millis(1),
            ..Self::default()
        }
    }

    pub fn with_deduction_cap(mut self, cap: Percentage) -> Self {
        self.default_deduction_cap = cap;
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.conflict_retry_attempts = attempts.max(1);
        self
    }
}
