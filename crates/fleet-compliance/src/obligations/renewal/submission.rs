use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::obligations::archive::EvidenceUpload;
use crate::obligations::domain::{AssetId, ObligationCategory, ObligationDetails, RuleParams, TaxTier};
use crate::obligations::rules::{tax, ColorBand, RuleEngine, RuleError, Semester};

/// Typed renewal payload, one variant per obligation category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum RenewalSubmission {
    Emissions {
        folio: String,
        /// Date the verification was performed.
        verified_on: NaiveDate,
        /// Holograma code as printed ("00", "0", "1", "2", ...).
        exemption: String,
        /// Engomado color; derived from `plate` when absent.
        #[serde(default)]
        color_band: Option<String>,
        #[serde(default)]
        plate: Option<String>,
    },
    Insurance {
        insurer: String,
        policy_type: String,
        policy_number: String,
        sum_insured: f64,
        premium: f64,
        coverage_start: NaiveDate,
        vigencia: NaiveDate,
        #[serde(default)]
        landline: Option<String>,
        #[serde(default)]
        mobile: Option<String>,
    },
    RegistrationTax {
        /// Calendar year the payment settles.
        period: i32,
        paid_on: NaiveDate,
        registration_amount: f64,
        ownership_tax_amount: f64,
        #[serde(default)]
        notes: Option<String>,
    },
    PlateRegistration {
        plate: String,
        folio: String,
        issued_on: NaiveDate,
        vigencia: NaiveDate,
        payment_amount: f64,
    },
}

/// A renewal as handed over by the submission layer.
#[derive(Debug, Clone)]
pub struct RenewalRequest {
    pub asset_id: AssetId,
    pub acting_user: String,
    pub submission: RenewalSubmission,
    pub evidence: Option<EvidenceUpload>,
}

/// Record fields derived from a submission and the category rule.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedRecord {
    pub issued_date: NaiveDate,
    pub effective_date: NaiveDate,
    pub params: RuleParams,
    pub details: ObligationDetails,
}

impl RenewalSubmission {
    pub const fn category(&self) -> ObligationCategory {
        match self {
            Self::Emissions { .. } => ObligationCategory::Emissions,
            Self::Insurance { .. } => ObligationCategory::Insurance,
            Self::RegistrationTax { .. } => ObligationCategory::RegistrationTax,
            Self::PlateRegistration { .. } => ObligationCategory::PlateRegistration,
        }
    }

    pub(crate) fn resolve(&self, engine: &RuleEngine) -> Result<ResolvedRecord, RuleError> {
        let category = self.category();
        match self {
            Self::Emissions {
                folio,
                verified_on,
                exemption,
                color_band,
                plate,
            } => {
                let color_band = color_band
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
                    .or_else(|| {
                        plate
                            .as_deref()
                            .and_then(ColorBand::from_plate)
                            .map(|band| band.label().to_string())
                    })
                    .unwrap_or_default();
                let params = RuleParams::Emissions {
                    exemption: exemption.trim().to_string(),
                    color_band,
                };
                let effective_date = engine.compute_next_due(category, *verified_on, &params)?;
                Ok(ResolvedRecord {
                    issued_date: *verified_on,
                    effective_date,
                    params,
                    details: ObligationDetails::Emissions {
                        folio: folio.clone(),
                        semester: Semester::containing(verified_on.month()).number(),
                        scheduled_for: Some(effective_date),
                        plate: plate.clone(),
                    },
                })
            }
            Self::Insurance {
                insurer,
                policy_type,
                policy_number,
                sum_insured,
                premium,
                coverage_start,
                vigencia,
                landline,
                mobile,
            } => {
                if vigencia <= coverage_start {
                    return Err(RuleError::invalid(
                        category,
                        format!("vigencia {vigencia} must fall after coverage start {coverage_start}"),
                    ));
                }
                non_negative(category, "premium", *premium)?;
                non_negative(category, "sum insured", *sum_insured)?;
                let params = RuleParams::Insurance { vigencia: *vigencia };
                Ok(ResolvedRecord {
                    issued_date: *coverage_start,
                    effective_date: engine.compute_next_due(category, *coverage_start, &params)?,
                    params,
                    details: ObligationDetails::Insurance {
                        insurer: insurer.clone(),
                        policy_type: policy_type.clone(),
                        policy_number: policy_number.clone(),
                        sum_insured: *sum_insured,
                        premium: *premium,
                        coverage_start: *coverage_start,
                        landline: landline.clone(),
                        mobile: mobile.clone(),
                    },
                })
            }
            Self::RegistrationTax {
                period,
                paid_on,
                registration_amount,
                ownership_tax_amount,
                notes,
            } => {
                non_negative(category, "registration amount", *registration_amount)?;
                non_negative(category, "ownership tax amount", *ownership_tax_amount)?;
                let tier = tax::tier_on(*paid_on);
                let cutoff = tax::cutoff_for(paid_on.year())
                    .ok_or_else(|| RuleError::out_of_range(category, *paid_on))?;
                let total = match tier {
                    TaxTier::OnTime => *registration_amount,
                    TaxTier::Late => registration_amount + ownership_tax_amount,
                };
                let params = RuleParams::RegistrationTax { period: *period };
                Ok(ResolvedRecord {
                    issued_date: *paid_on,
                    effective_date: engine.compute_next_due(category, *paid_on, &params)?,
                    params,
                    details: ObligationDetails::RegistrationTax {
                        registration_amount: *registration_amount,
                        ownership_tax_amount: *ownership_tax_amount,
                        total,
                        tier,
                        cutoff,
                        notes: notes.clone(),
                    },
                })
            }
            Self::PlateRegistration {
                plate,
                folio,
                issued_on,
                vigencia,
                payment_amount,
            } => {
                if vigencia <= issued_on {
                    return Err(RuleError::invalid(
                        category,
                        format!("vigencia {vigencia} must fall after issue date {issued_on}"),
                    ));
                }
                non_negative(category, "payment amount", *payment_amount)?;
                let params = RuleParams::PlateRegistration { vigencia: *vigencia };
                Ok(ResolvedRecord {
                    issued_date: *issued_on,
                    effective_date: engine.compute_next_due(category, *issued_on, &params)?,
                    params,
                    details: ObligationDetails::PlateRegistration {
                        plate: plate.clone(),
                        folio: folio.clone(),
                        payment_amount: *payment_amount,
                    },
                })
            }
        }
    }
}

fn non_negative(category: ObligationCategory, field: &str, value: f64) -> Result<(), RuleError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(RuleError::invalid(
            category,
            format!("{field} must be a non-negative amount, got {value}"),
        ))
    }
}
