//! Tests for core_kernel error types

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use core_kernel::{CoreError, DateRange, FarmerId, MoneyError, Percentage, VendorId};

fn build(from: NaiveDate, to: NaiveDate, cap: rust_decimal::Decimal) -> Result<(DateRange, Percentage), CoreError> {
    Ok((DateRange::new(from, to)?, Percentage::new(cap)?))
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, day).unwrap()
}

#[test]
fn test_question_mark_collects_kernel_errors() {
    assert!(build(date(1), date(15), dec!(20)).is_ok());
    assert!(matches!(build(date(2), date(1), dec!(20)), Err(CoreError::Temporal(_))));
    assert!(matches!(build(date(1), date(2), dec!(120)), Err(CoreError::Money(_))));
}

#[test]
fn test_money_error_is_transparent() {
    let core_error: CoreError = MoneyError::InvalidPercentage(dec!(120)).into();
    assert_eq!(core_error.to_string(), MoneyError::InvalidPercentage(dec!(120)).to_string());
}

#[test]
fn test_invalid_identifier_names_the_kind() {
    let error = "FRM-not-a-uuid".parse::<FarmerId>().unwrap_err();
    assert!(error.to_string().contains("FarmerId"));
    assert!(error.to_string().contains("FRM-not-a-uuid"));

    assert!("".parse::<VendorId>().is_err());
}
