//! Monetary helpers with precise decimal arithmetic
//!
//! Every stored amount in the settlement engine is a `NUMERIC(12,2)`, so all
//! computed figures go through [`round_currency`] before they are persisted.
//! Commission and advance-deduction rates are [`Percentage`] values, which are
//! guaranteed to stay within `[0, 100]`.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of decimal places kept for stored amounts
pub const CURRENCY_SCALE: u32 = 2;

/// Currency codes following ISO 4217
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    INR,
    USD,
    EUR,
    KES,
    LKR,
}

impl Currency {
    /// Returns the currency symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::INR => "₹",
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::KES => "KSh",
            Currency::LKR => "Rs",
        }
    }

    /// Returns the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::INR => "INR",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::KES => "KES",
            Currency::LKR => "LKR",
        }
    }

    /// Formats an amount with the currency symbol at stored precision
    pub fn format(&self, amount: Decimal) -> String {
        format!("{}{:.2}", self.symbol(), round_currency(amount))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INR" => Ok(Currency::INR),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "KES" => Ok(Currency::KES),
            "LKR" => Ok(Currency::LKR),
            other => Err(MoneyError::UnknownCurrency(other.to_string())),
        }
    }
}

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Percentage must be between 0 and 100, got {0}")]
    InvalidPercentage(Decimal),

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),
}

/// Rounds an amount to stored precision (2 dp, midpoint away from zero)
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// A percentage in the closed range `[0, 100]`
///
/// Stored as the percentage figure itself (`10` means ten percent), which is
/// how commission and deduction caps are configured and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub const ZERO: Percentage = Percentage(Decimal::ZERO);
    pub const HUNDRED: Percentage = Percentage(Decimal::ONE_HUNDRED);

    /// Creates a percentage, rejecting values outside `[0, 100]`
    pub fn new(value: Decimal) -> Result<Self, MoneyError> {
        if value < Decimal::ZERO || value > dec!(100) {
            return Err(MoneyError::InvalidPercentage(value));
        }
        Ok(Self(value.normalize()))
    }

    /// Returns the percentage figure (e.g. `20` for twenty percent)
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Returns the rate as a fraction (e.g. `0.2` for twenty percent)
    pub fn as_fraction(&self) -> Decimal {
        self.0 / dec!(100)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Applies this percentage to an amount, rounded to stored precision
    pub fn of(&self, amount: Decimal) -> Decimal {
        round_currency(amount * self.0 / dec!(100))
    }

    /// Applies this percentage truncated toward zero, so the result never
    /// exceeds the exact share
    pub fn of_truncated(&self, amount: Decimal) -> Decimal {
        (amount * self.0 / dec!(100)).round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::ToZero)
    }
}

impl Default for Percentage {
    fn default() -> Self {
        Self::ZERO
    }
}

impl TryFrom<Decimal> for Percentage {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Percentage::new(value)
    }
}

impl From<Percentage> for Decimal {
    fn from(p: Percentage) -> Decimal {
        p.0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_currency_midpoint() {
        assert_eq!(round_currency(dec!(10.005)), dec!(10.01));
        assert_eq!(round_currency(dec!(-10.005)), dec!(-10.01));
        assert_eq!(round_currency(dec!(10.004)), dec!(10.00));
    }

    #[test]
    fn test_percentage_bounds() {
        assert!(Percentage::new(dec!(0)).is_ok());
        assert!(Percentage::new(dec!(100)).is_ok());
        assert_eq!(
            Percentage::new(dec!(100.01)),
            Err(MoneyError::InvalidPercentage(dec!(100.01)))
        );
        assert!(Percentage::new(dec!(-1)).is_err());
    }

    #[test]
    fn test_percentage_of() {
        let ten = Percentage::new(dec!(10)).unwrap();
        assert_eq!(ten.of(dec!(920)), dec!(92));
        assert_eq!(ten.as_fraction(), dec!(0.1));
    }

    #[test]
    fn test_percentage_of_truncated() {
        let half = Percentage::new(dec!(50)).unwrap();
        assert_eq!(half.of(dec!(1000.03)), dec!(500.02));
        assert_eq!(half.of_truncated(dec!(1000.03)), dec!(500.01));
        assert_eq!(half.of_truncated(dec!(-1000.03)), dec!(-500.01));
    }

    #[test]
    fn test_percentage_deserialize_rejects_out_of_range() {
        let parsed: Result<Percentage, _> = serde_json::from_str("150");
        assert!(parsed.is_err());

        let parsed: Percentage = serde_json::from_str("12.5").unwrap();
        assert_eq!(parsed.value(), dec!(12.5));
    }

    #[test]
    fn test_currency_format() {
        assert_eq!(Currency::INR.format(dec!(1600)), "₹1600.00");
        assert_eq!("usd".parse::<Currency>().unwrap(), Currency::USD);
    }
}
