use chrono::{Duration, NaiveDate};
use serde::Serialize;

use super::super::domain::{ObligationRecord, RuleParams};
use super::{tax, RuleError};

/// Earliest date a replacement for the active record is accepted.
///
/// Windows have no upper bound: once open, an expired record can be renewed
/// at any later date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenewalWindow {
    pub opens_on: Option<NaiveDate>,
    pub expires_on: NaiveDate,
}

impl RenewalWindow {
    pub fn is_open(&self, today: NaiveDate) -> bool {
        self.opens_on.map_or(true, |opens_on| today >= opens_on)
    }

    pub fn days_remaining(&self, today: NaiveDate) -> i64 {
        (self.expires_on - today).num_days()
    }
}

pub(super) fn window_for(
    record: &ObligationRecord,
    eligibility_days: Option<u32>,
) -> Result<RenewalWindow, RuleError> {
    let category = record.category();
    let before = |anchor: NaiveDate, days: u32| {
        anchor
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| RuleError::out_of_range(category, anchor))
    };

    let opens_on = match &record.params {
        RuleParams::Insurance { vigencia } | RuleParams::PlateRegistration { vigencia } => {
            eligibility_days
                .map(|days| before(*vigencia, days))
                .transpose()?
        }
        RuleParams::RegistrationTax { period } => Some(
            tax::next_period_opens(*period)
                .ok_or_else(|| RuleError::out_of_range(category, record.issued_date))?,
        ),
        RuleParams::Emissions { .. } => eligibility_days
            .map(|days| before(record.effective_date, days))
            .transpose()?,
    };

    Ok(RenewalWindow {
        opens_on,
        expires_on: record.effective_date,
    })
}
