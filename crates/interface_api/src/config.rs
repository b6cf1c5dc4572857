//! API configuration

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use core_kernel::{Currency, Percentage};
use domain_settlement::SettlementConfig;
use infra_db::DatabaseConfig;

/// API configuration
///
/// Loaded from `API_*` environment variables, e.g. `API_PORT=8080`,
/// `API_DEFAULT_DEDUCTION_CAP_PERCENT=25`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database URL
    pub database_url: String,
    pub db_max_connections: u32,
    /// Row lock wait before a settlement request fails as a retryable conflict
    pub lock_timeout_ms: u64,
    /// Log level, used when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit logs as JSON lines
    pub json_logs: bool,
    /// Advance deduction cap as a share of net-after-commission
    pub default_deduction_cap_percent: Decimal,
    /// Lookback used when a request omits its dates
    pub default_range_days: u64,
    pub dispatch_timeout_ms: u64,
    pub conflict_retry_attempts: u32,
    /// Directory statements are written to
    pub statement_dir: String,
    /// Public URL prefix under which `statement_dir` is served
    pub statement_url_prefix: String,
    pub currency: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "postgres://localhost/harvest".to_string(),
            db_max_connections: 10,
            lock_timeout_ms: 5_000,
            log_level: "info".to_string(),
            json_logs: false,
            default_deduction_cap_percent: dec!(20),
            default_range_days: 15,
            dispatch_timeout_ms: 10_000,
            conflict_retry_attempts: 3,
            statement_dir: "static/settlements".to_string(),
            statement_url_prefix: "/static/settlements".to_string(),
            currency: "INR".to_string(),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment, falling back to defaults
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        config::Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", defaults.port as i64)?
            .set_default("database_url", defaults.database_url)?
            .set_default("db_max_connections", defaults.db_max_connections as i64)?
            .set_default("lock_timeout_ms", defaults.lock_timeout_ms as i64)?
            .set_default("log_level", defaults.log_level)?
            .set_default("json_logs", defaults.json_logs)?
            .set_default("default_deduction_cap_percent", defaults.default_deduction_cap_percent.to_string())?
            .set_default("default_range_days", defaults.default_range_days as i64)?
            .set_default("dispatch_timeout_ms", defaults.dispatch_timeout_ms as i64)?
            .set_default("conflict_retry_attempts", defaults.conflict_retry_attempts as i64)?
            .set_default("statement_dir", defaults.statement_dir)?
            .set_default("statement_url_prefix", defaults.statement_url_prefix)?
            .set_default("currency", defaults.currency)?
            .add_source(config::Environment::with_prefix("API").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(&self.database_url)
            .max_connections(self.db_max_connections)
            .lock_timeout(Duration::from_millis(self.lock_timeout_ms))
    }

    /// Domain settings derived from this configuration
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError::Message` for an out-of-range cap or an unknown
    /// currency code.
    pub fn settlement_config(&self) -> Result<SettlementConfig, config::ConfigError> {
        let cap = Percentage::new(self.default_deduction_cap_percent)
            .map_err(|e| config::ConfigError::Message(format!("default_deduction_cap_percent: {e}")))?;
        let currency: Currency = self
            .currency
            .parse()
            .map_err(|e| config::ConfigError::Message(format!("currency: {e}")))?;

        Ok(SettlementConfig {
            default_deduction_cap: cap,
            default_range_days: self.default_range_days,
            dispatch_timeout: Duration::from_millis(self.dispatch_timeout_ms),
            currency,
            ..SettlementConfig::default()
        }
        .with_retry_attempts(self.conflict_retry_attempts))
    }
}
