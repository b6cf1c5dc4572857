//! Property-Based Test Generators
//!
//! Proptest strategies producing values the collection ledger accepts:
//! non-negative quantities, rates and costs at stored precision.

use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::Percentage;
use domain_settlement::NewCollectionItem;

/// Non-negative amount with 2 decimal places, up to `max_units`
pub fn amount_strategy(max_units: i64) -> impl Strategy<Value = Decimal> {
    (0i64..=max_units * 100).prop_map(|minor| Decimal::new(minor, 2))
}

/// Quantity in kg with gram precision
pub fn qty_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=500_000i64).prop_map(|grams| Decimal::new(grams, 3))
}

/// Rate per kg with paise precision
pub fn rate_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=100_000i64).prop_map(|minor| Decimal::new(minor, 2))
}

/// Percentage between 0 and 100 with 2 decimal places
pub fn percentage_strategy() -> impl Strategy<Value = Percentage> {
    (0i64..=10_000i64).prop_map(|hundredths| {
        Percentage::new(Decimal::new(hundredths, 2)).expect("generated percentage in range")
    })
}

/// Collection item input with template ids and a random delivery
///
/// Handling costs stay small relative to the goods value so most generated
/// items settle to a payable amount.
pub fn collection_input_strategy(template: NewCollectionItem) -> impl Strategy<Value = NewCollectionItem> {
    (qty_strategy(), rate_strategy(), amount_strategy(5), amount_strategy(50), amount_strategy(50)).prop_map(
        move |(qty, rate, labour_per_unit, coolie_cost, transport_cost)| NewCollectionItem {
            qty,
            rate,
            labour_per_unit,
            coolie_cost,
            transport_cost,
            ..template.clone()
        },
    )
}
