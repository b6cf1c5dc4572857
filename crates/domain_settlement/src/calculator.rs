//! Settlement calculation
//!
//! Pure aggregation of collection items into settlement figures:
//!
//! ```text
//! net_before_commission = gross - labour - coolie - transport
//! commission            = net_before_commission * commission%
//! net_after_commission  = net_before_commission - commission
//! cap                   = net_after_commission * deduction_cap%, truncated
//! advance_deducted      = min(outstanding advance, max(cap, 0))
//! net_payable           = net_after_commission - advance_deducted
//! ```
//!
//! Every figure is rounded to stored precision before it feeds the next step,
//! so the persisted figures satisfy
//! `net_payable = gross - commission - labour - coolie - transport - advance_deducted`
//! exactly.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{round_currency, CollectionItemId, Percentage};

use crate::collection::CollectionItem;
use crate::error::SettlementError;

/// Inputs to a settlement calculation
#[derive(Debug, Clone, Copy)]
pub struct SettlementInput<'a> {
    pub items: &'a [CollectionItem],
    pub commission: Percentage,
    /// Farmer's advance balance before this operation
    pub advance_balance: Decimal,
    pub deduction_cap: Percentage,
}

/// The snapshot of one consumed collection item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSnapshot {
    pub collection_item_id: CollectionItemId,
    pub line_total: Decimal,
}

/// Result of a settlement calculation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementBreakdown {
    pub total_qty: Decimal,
    pub gross_amount: Decimal,
    pub total_labour: Decimal,
    pub total_coolie: Decimal,
    pub total_transport: Decimal,
    pub net_before_commission: Decimal,
    pub commission_percent: Percentage,
    pub total_commission: Decimal,
    pub net_after_commission: Decimal,
    pub advance_deducted: Decimal,
    pub net_payable: Decimal,
    pub lines: Vec<LineSnapshot>,
}

/// Computes the settlement figures for `input`
///
/// # Errors
///
/// - `InvalidState` if there are no items to settle
/// - `InvalidCalculation` if the net payable would be negative
pub fn calculate(input: SettlementInput<'_>) -> Result<SettlementBreakdown, SettlementError> {
    if input.items.is_empty() {
        return Err(SettlementError::invalid_state("no unsettled collections"));
    }

    let mut total_qty = Decimal::ZERO;
    let mut gross_amount = Decimal::ZERO;
    let mut total_labour = Decimal::ZERO;
    let mut total_coolie = Decimal::ZERO;
    let mut total_transport = Decimal::ZERO;
    let mut lines = Vec::with_capacity(input.items.len());

    for item in input.items {
        total_qty += item.qty;
        gross_amount += item.line_total;
        total_labour += item.labour_cost;
        total_coolie += item.coolie_cost;
        total_transport += item.transport_cost;
        lines.push(LineSnapshot {
            collection_item_id: item.id,
            line_total: item.line_total,
        });
    }

    let gross_amount = round_currency(gross_amount);
    let total_labour = round_currency(total_labour);
    let total_coolie = round_currency(total_coolie);
    let total_transport = round_currency(total_transport);

    let net_before_commission = gross_amount - total_labour - total_coolie - total_transport;
    let total_commission = input.commission.of(net_before_commission);
    let net_after_commission = net_before_commission - total_commission;

    // Truncated so the deduction never exceeds the exact cap
    let cap = input.deduction_cap.of_truncated(net_after_commission).max(Decimal::ZERO);
    let advance_deducted = round_currency(input.advance_balance.max(Decimal::ZERO)).min(cap);

    let net_payable = net_after_commission - advance_deducted;
    if net_payable < Decimal::ZERO {
        return Err(SettlementError::InvalidCalculation {
            message: "handling costs and commission exceed the gross amount".to_string(),
            net_payable,
        });
    }

    Ok(SettlementBreakdown {
        total_qty,
        gross_amount,
        total_labour,
        total_coolie,
        total_transport,
        net_before_commission,
        commission_percent: input.commission,
        total_commission,
        net_after_commission,
        advance_deducted,
        net_payable,
        lines,
    })
}


#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use core_kernel::{FarmerId, VendorId};
    use proptest::prelude::*;

    fn arb_item() -> impl Strategy<Value = CollectionItem> {
        (0i64..500_000, 0i64..20_000, 0i64..20_000, 0i64..20_000).prop_map(
            |(line, labour, coolie, transport)| CollectionItem {
                id: CollectionItemId::new(),
                vendor_id: VendorId::new(),
                farmer_id: FarmerId::new(),
                group_id: None,
                date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                qty: Decimal::ONE,
                rate: Decimal::new(line, 2),
                labour_cost: Decimal::new(labour, 2),
                coolie_cost: Decimal::new(coolie, 2),
                transport_cost: Decimal::new(transport, 2),
                line_total: Decimal::new(line, 2),
                is_locked: false,
                created_at: Utc::now(),
            },
        )
    }

    proptest! {
        #[test]
        fn successful_settlements_satisfy_the_payable_identity(
            items in prop::collection::vec(arb_item(), 1..8),
            commission_bp in 0i64..=10_000,
            cap_bp in 0i64..=10_000,
            advance in 0i64..10_000_000,
        ) {
            let advance_balance = Decimal::new(advance, 2);
            let cap = Percentage::new(Decimal::new(cap_bp, 2)).unwrap();
            let result = calculate(SettlementInput {
                items: &items,
                commission: Percentage::new(Decimal::new(commission_bp, 2)).unwrap(),
                advance_balance,
                deduction_cap: cap,
            });

            if let Ok(b) = result {
                prop_assert!(b.net_payable >= Decimal::ZERO);
                prop_assert!(b.advance_deducted >= Decimal::ZERO);
                prop_assert!(b.advance_deducted <= advance_balance);
                prop_assert!(
                    b.advance_deducted <= (b.net_after_commission * cap.value() / Decimal::ONE_HUNDRED).max(Decimal::ZERO)
                );
                prop_assert_eq!(
                    b.net_payable,
                    b.gross_amount - b.total_commission - b.total_labour
                        - b.total_coolie - b.total_transport - b.advance_deducted
                );
            }
        }
    }
}
