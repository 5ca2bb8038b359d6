//! Due-date rules for each obligation category.
//!
//! Everything here is pure: no clocks, no storage. Month and year arithmetic
//! always clamps to the destination month's last day, and year increments are
//! decided by comparing months rather than elapsed time.

mod calendar;
pub mod emissions;
pub mod tax;
mod window;

use chrono::NaiveDate;
use tracing::warn;

use super::config::ComplianceConfig;
use super::domain::{ObligationCategory, ObligationRecord, RuleParams};

pub use calendar::{add_months_clamped, add_years_clamped, clamped_date, last_day_of_month};
pub use emissions::{emissions_calendar, CalendarMonth, ColorBand, Exemption, Semester};
pub use window::RenewalWindow;

/// Errors raised while evaluating a rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("invalid parameters for {category}: {reason}")]
    InvalidParameters {
        category: ObligationCategory,
        reason: String,
    },
}

impl RuleError {
    pub(crate) fn invalid(category: ObligationCategory, reason: impl Into<String>) -> Self {
        Self::InvalidParameters {
            category,
            reason: reason.into(),
        }
    }

    pub(crate) fn out_of_range(category: ObligationCategory, reference: NaiveDate) -> Self {
        Self::invalid(
            category,
            format!("due date computed from {reference} falls outside the supported calendar"),
        )
    }
}

/// Stateless evaluator applying the category rule to stored parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEngine;

impl RuleEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn compute_next_due(
        &self,
        category: ObligationCategory,
        reference: NaiveDate,
        params: &RuleParams,
    ) -> Result<NaiveDate, RuleError> {
        if params.category() != category {
            return Err(RuleError::invalid(
                category,
                format!("expected {category} parameters, found {}", params.category()),
            ));
        }

        let due = match params {
            RuleParams::Emissions {
                exemption,
                color_band,
            } => {
                let exemption = Exemption::parse(exemption);
                let band = ColorBand::parse(color_band);
                if exemption == Exemption::Standard && band.is_none() {
                    warn!(
                        color_band = %color_band,
                        %reference,
                        "unrecognized color band, using fixed verification interval"
                    );
                }
                emissions::next_due(reference, exemption, band)
            }
            RuleParams::Insurance { vigencia } | RuleParams::PlateRegistration { vigencia } => {
                Some(*vigencia)
            }
            RuleParams::RegistrationTax { period } => tax::next_due(*period),
        };

        due.ok_or_else(|| RuleError::out_of_range(category, reference))
    }

    /// Due date for the cycle following `record`, from its stored parameters.
    pub fn next_due_for(&self, record: &ObligationRecord) -> Result<NaiveDate, RuleError> {
        self.compute_next_due(record.category(), record.reference_date(), &record.params)
    }

    pub fn renewal_window(
        &self,
        record: &ObligationRecord,
        config: &ComplianceConfig,
    ) -> Result<RenewalWindow, RuleError> {
        window::window_for(record, config.eligibility_days(record.category()))
    }
}
