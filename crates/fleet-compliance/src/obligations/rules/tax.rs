use chrono::{Datelike, NaiveDate};

use super::super::domain::TaxTier;

const CUTOFF_MONTH: u32 = 3;
const CUTOFF_DAY: u32 = 31;

/// Last day to pay the registration fee without the ownership-tax surcharge.
pub fn cutoff_for(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, CUTOFF_MONTH, CUTOFF_DAY)
}

/// A period is settled once; the next payment is owed by the following cutoff.
pub fn next_due(period: i32) -> Option<NaiveDate> {
    cutoff_for(period.checked_add(1)?)
}

/// First day on which a payment for the period after `period` is accepted.
pub fn next_period_opens(period: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(period.checked_add(1)?, 1, 1)
}

pub fn tier_on(date: NaiveDate) -> TaxTier {
    match cutoff_for(date.year()) {
        Some(cutoff) if date <= cutoff => TaxTier::OnTime,
        _ => TaxTier::Late,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn due_date_is_fixed_regardless_of_payment_day() {
        assert_eq!(next_due(2025), Some(date(2026, 3, 31)));
        assert_eq!(next_due(2024), Some(date(2025, 3, 31)));
    }

    #[test]
    fn tier_switches_after_the_cutoff() {
        assert_eq!(tier_on(date(2025, 1, 2)), TaxTier::OnTime);
        assert_eq!(tier_on(date(2025, 3, 31)), TaxTier::OnTime);
        assert_eq!(tier_on(date(2025, 4, 1)), TaxTier::Late);
        assert_eq!(tier_on(date(2025, 12, 31)), TaxTier::Late);
    }

    #[test]
    fn next_period_opens_on_new_year() {
        assert_eq!(next_period_opens(2025), Some(date(2026, 1, 1)));
        assert_eq!(next_period_opens(i32::MAX), None);
    }
}
