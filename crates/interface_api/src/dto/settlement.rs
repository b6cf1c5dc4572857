//! Settlement DTOs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use core_kernel::{DateRange, FarmerId, Percentage, TemporalError};
use domain_settlement::SettlementRequest;

use crate::error::ApiError;

/// Body of `generate` and `recalculate`
///
/// Omitted dates default to the window of `default_range_days` ending today;
/// an omitted start with a given end looks back from that end.
#[derive(Debug, Deserialize)]
pub struct SettlementPeriodRequest {
    pub farmer_id: Uuid,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Overrides the configured advance deduction cap
    pub deduction_cap_percent: Option<Decimal>,
}

impl SettlementPeriodRequest {
    pub fn period(&self, today: NaiveDate, default_days: u64) -> Result<DateRange, TemporalError> {
        match (self.date_from, self.date_to) {
            (Some(from), Some(to)) => DateRange::new(from, to),
            (Some(from), None) => DateRange::new(from, today),
            (None, Some(to)) => DateRange::ending_at(to, default_days),
            (None, None) => DateRange::ending_at(today, default_days),
        }
    }

    pub fn into_request(self, today: NaiveDate, default_days: u64) -> Result<SettlementRequest, ApiError> {
        let period = self
            .period(today, default_days)
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        let request = SettlementRequest::new(FarmerId::from_uuid(self.farmer_id), period);

        match self.deduction_cap_percent {
            Some(cap) => {
                let cap = Percentage::new(cap).map_err(|e| ApiError::Validation(e.to_string()))?;
                Ok(request.with_deduction_cap(cap))
            }
            None => Ok(request),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct VoidSettlementRequest {
    #[validate(length(min = 3, max = 255))]
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn body(from: Option<NaiveDate>, to: Option<NaiveDate>) -> SettlementPeriodRequest {
        SettlementPeriodRequest {
            farmer_id: Uuid::new_v4(),
            date_from: from,
            date_to: to,
            deduction_cap_percent: None,
        }
    }

    #[test]
    fn test_missing_dates_default_to_lookback_window() {
        let period = body(None, None).period(date(20), 15).unwrap();
        assert_eq!(period.date_from(), date(5));
        assert_eq!(period.date_to(), date(20));

        let period = body(None, Some(date(16))).period(date(20), 15).unwrap();
        assert_eq!(period.date_from(), date(1));

        let period = body(Some(date(10)), None).period(date(20), 15).unwrap();
        assert_eq!(period.date_to(), date(20));
    }

    #[test]
    fn test_inverted_range_is_a_validation_error() {
        let result = body(Some(date(20)), Some(date(10))).into_request(date(20), 15);
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_cap_override_must_be_a_percentage() {
        let mut request = body(None, None);
        request.deduction_cap_percent = Some(dec!(150));
        assert!(matches!(request.into_request(date(20), 15), Err(ApiError::Validation(_))));

        let mut request = body(None, None);
        request.deduction_cap_percent = Some(dec!(50));
        let request = request.into_request(date(20), 15).unwrap();
        assert_eq!(request.deduction_cap.map(|c| c.value()), Some(dec!(50)));
    }

    #[test]
    fn test_void_reason_length() {
        let short = VoidSettlementRequest { reason: "no".to_string() };
        assert!(short.validate().is_err());

        let ok = VoidSettlementRequest { reason: "wrong rate entered".to_string() };
        assert!(ok.validate().is_ok());
    }
}
