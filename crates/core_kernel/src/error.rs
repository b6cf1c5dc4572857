//! Kernel error type
//!
//! Collects the value-level failures of the kernel so callers holding several
//! of them can use a single `?`.

use thiserror::Error;

use crate::money::MoneyError;
use crate::temporal::TemporalError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error(transparent)]
    Temporal(#[from] TemporalError),

    /// Text that is neither a bare UUID nor `<PREFIX>-<uuid>` for the kind
    #[error("invalid {kind} {value:?}")]
    InvalidIdentifier { kind: &'static str, value: String },
}

impl CoreError {
    pub fn invalid_identifier(kind: &'static str, value: impl Into<String>) -> Self {
        CoreError::InvalidIdentifier {
            kind,
            value: value.into(),
        }
    }
}
