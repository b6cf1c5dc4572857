//! Advance ledger bookkeeping
//!
//! Advances are immutable signed ledger entries: positive when cash is given to
//! a farmer, negative when it is recovered or deducted by a settlement. The
//! farmer's `advance_total` is a cached running sum of these entries.
//!
//! # Invariants
//!
//! - Every change to `Farmer::advance_total` is paired with exactly one entry
//!   of the same signed amount, written in the same transaction
//! - Entries are never updated or deleted; a void writes a compensating entry

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{round_currency, AdvanceId, FarmerId, SettlementId, VendorId};

use crate::audit::Audited;
use crate::error::SettlementError;

/// A signed advance ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advance {
    pub id: AdvanceId,
    pub vendor_id: VendorId,
    pub farmer_id: FarmerId,
    /// Positive = given, negative = recovered or deducted
    pub amount: Decimal,
    pub note: Option<String>,
    /// Settlement that produced this entry, if any
    pub settlement_id: Option<SettlementId>,
    pub created_at: DateTime<Utc>,
}

/// Direction of a manual advance operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceKind {
    /// Cash handed to the farmer
    Give,
    /// Cash paid back by the farmer outside a settlement
    Recover,
}

impl Advance {
    fn entry(
        vendor_id: VendorId,
        farmer_id: FarmerId,
        amount: Decimal,
        note: Option<String>,
        settlement_id: Option<SettlementId>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AdvanceId::new_v7(),
            vendor_id,
            farmer_id,
            amount: round_currency(amount),
            note,
            settlement_id,
            created_at: at,
        }
    }

    /// A manual entry; `amount` is the unsigned magnitude
    ///
    /// # Errors
    ///
    /// Returns `Validation` unless `amount` is positive.
    pub fn manual(
        vendor_id: VendorId,
        farmer_id: FarmerId,
        kind: AdvanceKind,
        amount: Decimal,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Self, SettlementError> {
        let amount = round_currency(amount);
        if amount <= Decimal::ZERO {
            return Err(SettlementError::validation("advance amount must be positive"));
        }
        let signed = match kind {
            AdvanceKind::Give => amount,
            AdvanceKind::Recover => -amount,
        };
        Ok(Self::entry(vendor_id, farmer_id, signed, note, None, at))
    }

    /// Negative entry recording a settlement's deduction
    pub fn settlement_deduction(
        vendor_id: VendorId,
        farmer_id: FarmerId,
        settlement_id: SettlementId,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Self {
        Self::entry(
            vendor_id,
            farmer_id,
            -amount.abs(),
            Some(format!("Deducted by settlement {settlement_id}")),
            Some(settlement_id),
            at,
        )
    }

    /// Positive entry restoring a settlement's earlier deduction
    pub fn settlement_restoration(
        vendor_id: VendorId,
        farmer_id: FarmerId,
        settlement_id: SettlementId,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Self {
        Self::entry(
            vendor_id,
            farmer_id,
            amount.abs(),
            Some(format!("Restored from settlement {settlement_id}")),
            Some(settlement_id),
            at,
        )
    }

    pub fn is_given(&self) -> bool {
        self.amount > Decimal::ZERO
    }
}

impl Audited for Advance {
    const TABLE: &'static str = "advances";

    fn record_id(&self) -> Uuid {
        *self.id.as_uuid()
    }
}

/// Ledger view of a farmer's advances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceSummary {
    pub farmer_id: FarmerId,
    /// Sum of positive entries
    pub given: Decimal,
    /// Magnitude of the sum of negative entries
    pub deducted: Decimal,
    /// Cached balance on the farmer row
    pub balance: Decimal,
    pub entries: Vec<Advance>,
}

impl AdvanceSummary {
    pub fn from_entries(farmer_id: FarmerId, balance: Decimal, entries: Vec<Advance>) -> Self {
        let (given, deducted) = entries.iter().fold(
            (Decimal::ZERO, Decimal::ZERO),
            |(given, deducted), entry| {
                if entry.is_given() {
                    (given + entry.amount, deducted)
                } else {
                    (given, deducted - entry.amount)
                }
            },
        );
        Self {
            farmer_id,
            given,
            deducted,
            balance,
            entries,
        }
    }
}

/// Drift check between the cached balance and the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceReconciliation {
    pub farmer_id: FarmerId,
    pub cached_total: Decimal,
    pub ledger_total: Decimal,
    pub is_consistent: bool,
}

impl AdvanceReconciliation {
    pub fn check(farmer_id: FarmerId, cached_total: Decimal, entries: &[Advance]) -> Self {
        let ledger_total: Decimal = entries.iter().map(|e| e.amount).sum();
        Self {
            farmer_id,
            cached_total,
            ledger_total,
            is_consistent: cached_total == ledger_total,
        }
    }

    pub fn drift(&self) -> Decimal {
        self.cached_total - self.ledger_total
    }
}
