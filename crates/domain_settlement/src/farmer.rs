//! Farmers and farmer groups

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{FarmerGroupId, FarmerId, Percentage, VendorId};

use crate::audit::Audited;
use crate::error::SettlementError;

/// A farmer supplying a vendor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Farmer {
    pub id: FarmerId,
    pub vendor_id: VendorId,
    pub group_id: Option<FarmerGroupId>,
    pub name: String,
    pub phone: Option<String>,
    /// Farmer-level override; `None` falls back to the group default
    pub commission_percent: Option<Percentage>,
    /// Cached running sum of the farmer's advance ledger
    pub advance_total: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Farmer {
    pub fn new(vendor_id: VendorId, name: impl Into<String>) -> Self {
        Self {
            id: FarmerId::new_v7(),
            vendor_id,
            group_id: None,
            name: name.into(),
            phone: None,
            commission_percent: None,
            advance_total: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }

    /// Outstanding balance available for deduction, never below zero
    pub fn outstanding_advance(&self) -> Decimal {
        self.advance_total.max(Decimal::ZERO)
    }

    /// Returns a copy with `delta` applied to the cached advance balance
    ///
    /// # Errors
    ///
    /// Returns `InvalidCalculation` if the balance would become negative.
    pub fn with_advance_delta(&self, delta: Decimal) -> Result<Self, SettlementError> {
        let next = self.advance_total + delta;
        if next < Decimal::ZERO {
            return Err(SettlementError::InvalidCalculation {
                message: format!(
                    "advance balance of farmer {} cannot go below zero",
                    self.id
                ),
                net_payable: next,
            });
        }
        Ok(Self {
            advance_total: next,
            ..self.clone()
        })
    }
}

impl Audited for Farmer {
    const TABLE: &'static str = "farmers";

    fn record_id(&self) -> Uuid {
        *self.id.as_uuid()
    }
}

/// A group of farmers sharing a default commission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmerGroup {
    pub id: FarmerGroupId,
    pub vendor_id: VendorId,
    pub name: String,
    pub commission_percent: Option<Percentage>,
}

impl FarmerGroup {
    pub fn new(vendor_id: VendorId, name: impl Into<String>, commission_percent: Option<Percentage>) -> Self {
        Self {
            id: FarmerGroupId::new_v7(),
            vendor_id,
            name: name.into(),
            commission_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_advance_delta() {
        let mut farmer = Farmer::new(VendorId::new(), "Ravi");
        farmer.advance_total = dec!(1000);

        let after = farmer.with_advance_delta(dec!(-400)).unwrap();
        assert_eq!(after.advance_total, dec!(600));
        assert_eq!(farmer.advance_total, dec!(1000));

        let result = after.with_advance_delta(dec!(-600.01));
        assert!(matches!(result, Err(SettlementError::InvalidCalculation { .. })));
    }

    #[test]
    fn test_outstanding_advance_clamps_at_zero() {
        let mut farmer = Farmer::new(VendorId::new(), "Meena");
        farmer.advance_total = dec!(-5);
        assert_eq!(farmer.outstanding_advance(), Decimal::ZERO);
    }
}
