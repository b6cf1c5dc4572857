//! Pre-built Test Fixtures
//!
//! Ready-to-use dates, rates and caller contexts. Dates fall in March 2026 so
//! `DateFixtures::day(n)` reads like a calendar day in test bodies.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{DateRange, Percentage, UserId, VendorId};
use domain_settlement::RequestContext;

static MONTH_START: Lazy<NaiveDate> =
    Lazy::new(|| NaiveDate::from_ymd_opt(2026, 3, 1).expect("valid fixture date"));

/// Fixture for settlement dates
pub struct DateFixtures;

impl DateFixtures {
    /// Day `n` (1-based) of the fixture month
    pub fn day(n: u32) -> NaiveDate {
        MONTH_START
            .with_day(n)
            .unwrap_or_else(|| panic!("day {n} is not in the fixture month"))
    }

    /// Inclusive range between two days of the fixture month
    pub fn period(from: u32, to: u32) -> DateRange {
        DateRange::new(Self::day(from), Self::day(to)).expect("fixture period must be ordered")
    }

    /// Days 1 to 15
    pub fn first_fortnight() -> DateRange {
        Self::period(1, 15)
    }

    /// Days 16 to 31
    pub fn second_fortnight() -> DateRange {
        Self::period(16, 31)
    }
}

/// Fixture for commission and cap rates
pub struct RateFixtures;

impl RateFixtures {
    pub fn percent(value: Decimal) -> Percentage {
        Percentage::new(value).expect("fixture percentage in range")
    }

    pub fn ten_percent() -> Percentage {
        Self::percent(dec!(10))
    }

    /// The default advance deduction cap
    pub fn twenty_percent() -> Percentage {
        Self::percent(dec!(20))
    }
}

/// Fixture for caller contexts
pub struct ContextFixtures;

impl ContextFixtures {
    /// A fresh vendor with an acting user
    pub fn vendor() -> RequestContext {
        RequestContext::new(VendorId::new(), Some(UserId::new()))
    }

    /// A fresh vendor acting without a user (system jobs)
    pub fn system() -> RequestContext {
        RequestContext::new(VendorId::new(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fortnights_cover_the_month() {
        let first = DateFixtures::first_fortnight();
        let second = DateFixtures::second_fortnight();
        assert_eq!(first.days() + second.days(), 31);
        assert!(!first.contains(second.date_from()));
    }

    #[test]
    fn test_contexts_are_isolated() {
        assert_ne!(ContextFixtures::vendor().vendor_id, ContextFixtures::vendor().vendor_id);
        assert!(ContextFixtures::system().user_id.is_none());
    }
}
