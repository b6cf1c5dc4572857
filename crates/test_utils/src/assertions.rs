//! Custom Test Assertions
//!
//! Assertion helpers for settlement figures that print the whole breakdown
//! on failure instead of a single mismatched number.

use rust_decimal::Decimal;
use serde_json::Value;

use domain_settlement::{Advance, CollectionItem, Farmer, Settlement, SettlementStatus};

/// Asserts `net_payable = gross - costs - commission - advance_deducted`
pub fn assert_payable_identity(settlement: &Settlement) {
    let expected = settlement.gross_amount
        - settlement.total_labour
        - settlement.total_coolie
        - settlement.total_transport
        - settlement.total_commission
        - settlement.advance_deducted;
    assert_eq!(
        settlement.net_payable, expected,
        "net payable does not add up: {settlement:#?}"
    );
    assert!(
        settlement.net_payable >= Decimal::ZERO,
        "net payable is negative: {}",
        settlement.net_payable
    );
}

/// Asserts the farmer's cached balance equals the sum of their ledger
pub fn assert_ledger_consistent(farmer: &Farmer, entries: &[Advance]) {
    let ledger: Decimal = entries.iter().map(|e| e.amount).sum();
    assert_eq!(
        farmer.advance_total, ledger,
        "cached advance {} differs from ledger sum {} over {} entries",
        farmer.advance_total,
        ledger,
        entries.len()
    );
}

/// Asserts every item has the expected lock flag
pub fn assert_items_locked(items: &[CollectionItem], locked: bool) {
    let mismatched: Vec<_> = items.iter().filter(|i| i.is_locked != locked).map(|i| i.id).collect();
    assert!(
        mismatched.is_empty(),
        "expected is_locked = {locked} but these items differ: {mismatched:?}"
    );
}

pub fn assert_status(settlement: &Settlement, status: SettlementStatus) {
    assert_eq!(
        settlement.status, status,
        "settlement {} is {:?}, expected {:?}",
        settlement.id, settlement.status, status
    );
}

/// Asserts a JSON field holds the given decimal
///
/// Decimals serialize as strings, so `"400.00"` and `400` compare equal.
pub fn assert_json_amount(value: &Value, field: &str, expected: Decimal) {
    let raw = &value[field];
    let actual: Decimal = match raw {
        Value::String(s) => s.parse().unwrap_or_else(|_| panic!("{field} = {s:?} is not a decimal")),
        Value::Number(n) => n
            .to_string()
            .parse()
            .unwrap_or_else(|_| panic!("{field} = {n} is not a decimal")),
        other => panic!("{field} is not an amount: {other}"),
    };
    assert_eq!(actual, expected, "unexpected {field} in {value}");
}
