//! Collection ledger records
//!
//! A collection item is one dated delivery of goods from a farmer. Its
//! `line_total` is fixed when the item is entered and is what settlements
//! aggregate, so later catalog price changes never rewrite history.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{round_currency, CollectionItemId, FarmerGroupId, FarmerId, VendorId};

use crate::audit::Audited;
use crate::error::SettlementError;

/// A single collection record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub id: CollectionItemId,
    pub vendor_id: VendorId,
    pub farmer_id: FarmerId,
    pub group_id: Option<FarmerGroupId>,
    pub date: NaiveDate,
    /// Quantity delivered (kg)
    pub qty: Decimal,
    /// Price per unit at entry time
    pub rate: Decimal,
    pub labour_cost: Decimal,
    pub coolie_cost: Decimal,
    pub transport_cost: Decimal,
    /// Gross value snapshot (`qty * rate` at entry time)
    pub line_total: Decimal,
    /// Set while the item is consumed by an active settlement
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a new collection item
#[derive(Debug, Clone)]
pub struct NewCollectionItem {
    pub vendor_id: VendorId,
    pub farmer_id: FarmerId,
    pub group_id: Option<FarmerGroupId>,
    pub date: NaiveDate,
    pub qty: Decimal,
    pub rate: Decimal,
    /// Labour charged per unit; multiplied by `qty`
    pub labour_per_unit: Decimal,
    pub coolie_cost: Decimal,
    pub transport_cost: Decimal,
}

impl CollectionItem {
    /// Records a collection item, computing its entry-time totals
    ///
    /// # Errors
    ///
    /// Returns `Validation` if any quantity, rate or cost is negative.
    pub fn record(new: NewCollectionItem) -> Result<Self, SettlementError> {
        let fields = [
            ("qty", new.qty),
            ("rate", new.rate),
            ("labour_per_unit", new.labour_per_unit),
            ("coolie_cost", new.coolie_cost),
            ("transport_cost", new.transport_cost),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| v.is_sign_negative() && !v.is_zero()) {
            return Err(SettlementError::validation(format!("{name} must not be negative")));
        }

        Ok(Self {
            id: CollectionItemId::new_v7(),
            vendor_id: new.vendor_id,
            farmer_id: new.farmer_id,
            group_id: new.group_id,
            date: new.date,
            qty: new.qty,
            rate: new.rate,
            labour_cost: round_currency(new.qty * new.labour_per_unit),
            coolie_cost: round_currency(new.coolie_cost),
            transport_cost: round_currency(new.transport_cost),
            line_total: round_currency(new.qty * new.rate),
            is_locked: false,
            created_at: Utc::now(),
        })
    }

    /// Sum of the handling costs charged against this item
    pub fn total_costs(&self) -> Decimal {
        self.labour_cost + self.coolie_cost + self.transport_cost
    }

    /// Guards edits and deletes coming from collection-entry workflows
    pub fn ensure_editable(&self) -> Result<(), SettlementError> {
        if self.is_locked {
            return Err(SettlementError::invalid_state(format!(
                "collection item {} is locked by a settlement",
                self.id
            )));
        }
        Ok(())
    }

    /// Returns a copy with the lock flag set to `locked`
    pub fn with_lock(&self, locked: bool) -> Self {
        Self {
            is_locked: locked,
            ..self.clone()
        }
    }
}

impl Audited for CollectionItem {
    const TABLE: &'static str = "collection_items";

    fn record_id(&self) -> Uuid {
        *self.id.as_uuid()
    }
}
