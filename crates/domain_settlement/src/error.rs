//! Settlement domain errors

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{MoneyError, PortError, TemporalError};

/// Errors that can occur while settling a farmer
///
/// Only [`SettlementError::ConcurrencyConflict`] is safe to retry; every other
/// variant is a client or data problem that a retry would reproduce.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Farmer or settlement absent, or outside the caller's tenant
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The requested transition is not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Figures do not add up to a payable settlement
    #[error("Invalid calculation: {message} (net payable {net_payable})")]
    InvalidCalculation { message: String, net_payable: Decimal },

    /// Lost a race with a concurrent writer; retry the whole operation
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Underlying store failure that is neither a conflict nor a not-found
    #[error("Storage error: {0}")]
    Storage(PortError),
}

impl SettlementError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        SettlementError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        SettlementError::InvalidState(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        SettlementError::Validation(message.into())
    }

    /// Returns true if the operation can be retried from scratch
    pub fn is_retryable(&self) -> bool {
        matches!(self, SettlementError::ConcurrencyConflict(_))
    }
}

impl From<PortError> for SettlementError {
    fn from(error: PortError) -> Self {
        match error {
            PortError::NotFound { entity, id } => SettlementError::NotFound { entity, id },
            PortError::Conflict(message) => SettlementError::ConcurrencyConflict(message),
            PortError::Validation(message) => SettlementError::Validation(message),
            other => SettlementError::Storage(other),
        }
    }
}

impl From<MoneyError> for SettlementError {
    fn from(error: MoneyError) -> Self {
        SettlementError::Validation(error.to_string())
    }
}

impl From<TemporalError> for SettlementError {
    fn from(error: TemporalError) -> Self {
        SettlementError::Validation(error.to_string())
    }
}

/// Failures of the post-commit document and notification steps
///
/// These never fail a settlement; they are reported as warnings.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Document rendering failed: {0}")]
    Render(String),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("{step} timed out after {timeout_ms}ms")]
    Timeout { step: &'static str, timeout_ms: u64 },

    #[error("Farmer has no phone number on file")]
    MissingContact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflicts_are_retryable() {
        let conflict: SettlementError = PortError::conflict("deadlock detected").into();
        assert!(conflict.is_retryable());

        assert!(!SettlementError::invalid_state("already voided").is_retryable());
        assert!(!SettlementError::not_found("Farmer", "FRM-1").is_retryable());
    }

    #[test]
    fn test_port_not_found_maps_entity() {
        let error: SettlementError = PortError::not_found("Settlement", "STL-1").into();
        assert!(matches!(
            error,
            SettlementError::NotFound { entity: "Settlement", .. }
        ));
    }

    #[test]
    fn test_unreachable_store_is_storage() {
        let error: SettlementError = PortError::unavailable("connection refused").into();
        assert!(matches!(error, SettlementError::Storage(_)));
        assert!(!error.is_retryable());
    }
}
