//! Advance DTOs

use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use domain_settlement::AdvanceKind;

/// Body of `POST /farmers/:id/advances`
///
/// `amount` is the unsigned magnitude; `kind` decides the direction.
#[derive(Debug, Deserialize, Validate)]
pub struct RecordAdvanceRequest {
    pub kind: AdvanceKind,
    pub amount: Decimal,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}
