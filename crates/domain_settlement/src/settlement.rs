//! Settlement aggregate and its state machine
//!
//! A settlement is created ACTIVE and may move to VOIDED exactly once. While
//! ACTIVE its figures may be overwritten by a recalculation; once VOIDED it is
//! frozen and kept for the audit trail together with its items.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{
    CollectionItemId, DateRange, FarmerId, Percentage, SettlementId, SettlementItemId, VendorId,
};

use crate::audit::Audited;
use crate::calculator::{LineSnapshot, SettlementBreakdown};
use crate::error::SettlementError;

const VOID_REASON_MIN: usize = 3;
const VOID_REASON_MAX: usize = 255;

/// Lifecycle status of a settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SettlementStatus {
    Active,
    Voided,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Active => "ACTIVE",
            SettlementStatus::Voided => "VOIDED",
        }
    }
}

impl std::str::FromStr for SettlementStatus {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(SettlementStatus::Active),
            "VOIDED" => Ok(SettlementStatus::Voided),
            other => Err(SettlementError::validation(format!(
                "unknown settlement status '{other}'"
            ))),
        }
    }
}

/// A farmer settlement for a date range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: SettlementId,
    pub vendor_id: VendorId,
    pub farmer_id: FarmerId,
    pub period: DateRange,
    pub total_qty: Decimal,
    pub gross_amount: Decimal,
    pub total_labour: Decimal,
    pub total_coolie: Decimal,
    pub total_transport: Decimal,
    /// Commission rate resolved when the figures were last computed
    pub commission_percent: Percentage,
    pub total_commission: Decimal,
    pub advance_deducted: Decimal,
    pub net_payable: Decimal,
    pub status: SettlementStatus,
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
    pub document_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Settlement {
    /// Creates an ACTIVE settlement carrying the figures of `breakdown`
    pub fn new_active(
        vendor_id: VendorId,
        farmer_id: FarmerId,
        period: DateRange,
        breakdown: &SettlementBreakdown,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SettlementId::new_v7(),
            vendor_id,
            farmer_id,
            period,
            total_qty: breakdown.total_qty,
            gross_amount: breakdown.gross_amount,
            total_labour: breakdown.total_labour,
            total_coolie: breakdown.total_coolie,
            total_transport: breakdown.total_transport,
            commission_percent: breakdown.commission_percent,
            total_commission: breakdown.total_commission,
            advance_deducted: breakdown.advance_deducted,
            net_payable: breakdown.net_payable,
            status: SettlementStatus::Active,
            voided_at: None,
            void_reason: None,
            document_url: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SettlementStatus::Active
    }

    /// Fails unless the settlement is ACTIVE
    pub fn ensure_active(&self) -> Result<(), SettlementError> {
        if !self.is_active() {
            return Err(SettlementError::invalid_state(format!(
                "settlement {} is {}",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    /// Overwrites the computed figures in place
    ///
    /// Used by recalculation; the commission snapshot is replaced with the rate
    /// resolved for this computation.
    pub fn apply_breakdown(
        &mut self,
        breakdown: &SettlementBreakdown,
        at: DateTime<Utc>,
    ) -> Result<(), SettlementError> {
        self.ensure_active()?;
        self.total_qty = breakdown.total_qty;
        self.gross_amount = breakdown.gross_amount;
        self.total_labour = breakdown.total_labour;
        self.total_coolie = breakdown.total_coolie;
        self.total_transport = breakdown.total_transport;
        self.commission_percent = breakdown.commission_percent;
        self.total_commission = breakdown.total_commission;
        self.advance_deducted = breakdown.advance_deducted;
        self.net_payable = breakdown.net_payable;
        self.updated_at = at;
        Ok(())
    }

    /// Transitions ACTIVE -> VOIDED
    ///
    /// # Errors
    ///
    /// - `Validation` if the trimmed reason is not 3 to 255 characters
    /// - `InvalidState` if the settlement is already voided
    pub fn void(&mut self, reason: &str, at: DateTime<Utc>) -> Result<(), SettlementError> {
        let reason = validate_void_reason(reason)?;
        self.ensure_active()?;
        self.status = SettlementStatus::Voided;
        self.voided_at = Some(at);
        self.void_reason = Some(reason);
        self.updated_at = at;
        Ok(())
    }

    pub fn summary(&self) -> SettlementSummary {
        SettlementSummary {
            id: self.id,
            farmer_id: self.farmer_id,
            date_from: self.period.date_from(),
            date_to: self.period.date_to(),
            status: self.status,
            gross_amount: self.gross_amount,
            total_commission: self.total_commission,
            advance_deducted: self.advance_deducted,
            net_payable: self.net_payable,
        }
    }
}

impl Audited for Settlement {
    const TABLE: &'static str = "settlements";

    fn record_id(&self) -> Uuid {
        *self.id.as_uuid()
    }
}

fn validate_void_reason(reason: &str) -> Result<String, SettlementError> {
    let trimmed = reason.trim();
    let len = trimmed.chars().count();
    if !(VOID_REASON_MIN..=VOID_REASON_MAX).contains(&len) {
        return Err(SettlementError::validation(format!(
            "void reason must be between {VOID_REASON_MIN} and {VOID_REASON_MAX} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Link between a settlement and a consumed collection item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementItem {
    pub id: SettlementItemId,
    pub settlement_id: SettlementId,
    pub collection_item_id: CollectionItemId,
    /// Snapshot of the item's `line_total` when it was linked
    pub line_total: Decimal,
}

impl SettlementItem {
    pub fn link(settlement_id: SettlementId, line: &LineSnapshot) -> Self {
        Self {
            id: SettlementItemId::new_v7(),
            settlement_id,
            collection_item_id: line.collection_item_id,
            line_total: line.line_total,
        }
    }
}

impl Audited for SettlementItem {
    const TABLE: &'static str = "settlement_items";

    fn record_id(&self) -> Uuid {
        *self.id.as_uuid()
    }
}

/// What callers get back from settlement operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub id: SettlementId,
    pub farmer_id: FarmerId,
    pub date_from: chrono::NaiveDate,
    pub date_to: chrono::NaiveDate,
    pub status: SettlementStatus,
    pub gross_amount: Decimal,
    pub total_commission: Decimal,
    pub advance_deducted: Decimal,
    pub net_payable: Decimal,
}
