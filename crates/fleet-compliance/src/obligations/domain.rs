use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::archive::ArtifactRef;

/// Identifier wrapper for vehicles; owned by the fleet directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier assigned by the obligation store to each stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rec-{:06}", self.0)
    }
}

/// Regulatory obligation tracked per vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationCategory {
    Emissions,
    Insurance,
    RegistrationTax,
    PlateRegistration,
}

impl ObligationCategory {
    pub const fn ordered() -> [Self; 4] {
        [
            Self::Emissions,
            Self::Insurance,
            Self::RegistrationTax,
            Self::PlateRegistration,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Emissions => "Emissions Verification",
            Self::Insurance => "Insurance Policy",
            Self::RegistrationTax => "Registration Tax",
            Self::PlateRegistration => "Plate Registration",
        }
    }

    /// Stable lowercase token used for storage paths and alert keys.
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Emissions => "emissions",
            Self::Insurance => "insurance",
            Self::RegistrationTax => "registration_tax",
            Self::PlateRegistration => "plate_registration",
        }
    }

    pub fn from_slug(value: &str) -> Option<Self> {
        Self::ordered()
            .into_iter()
            .find(|category| category.slug().eq_ignore_ascii_case(value.trim()))
    }
}

impl fmt::Display for ObligationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Rotation, locking, and archive key: one active record per pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObligationKey {
    pub asset_id: AssetId,
    pub category: ObligationCategory,
}

impl ObligationKey {
    pub fn new(asset_id: AssetId, category: ObligationCategory) -> Self {
        Self { asset_id, category }
    }
}

impl fmt::Display for ObligationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.asset_id, self.category)
    }
}

/// Inputs the rule engine needs to compute the next due date for a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleParams {
    /// Raw exemption code (holograma) and color band (engomado) as captured.
    Emissions {
        exemption: String,
        color_band: String,
    },
    Insurance {
        vigencia: NaiveDate,
    },
    /// Calendar year settled by the payment.
    RegistrationTax {
        period: i32,
    },
    PlateRegistration {
        vigencia: NaiveDate,
    },
}

impl RuleParams {
    pub const fn category(&self) -> ObligationCategory {
        match self {
            Self::Emissions { .. } => ObligationCategory::Emissions,
            Self::Insurance { .. } => ObligationCategory::Insurance,
            Self::RegistrationTax { .. } => ObligationCategory::RegistrationTax,
            Self::PlateRegistration { .. } => ObligationCategory::PlateRegistration,
        }
    }
}

/// Registration-tax payment tier relative to the March 31 cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxTier {
    /// Paid on or before the cutoff: registration fee only.
    OnTime,
    /// Paid after the cutoff: registration plus ownership tax, with surcharges.
    Late,
}

impl TaxTier {
    pub const fn label(self) -> &'static str {
        match self {
            Self::OnTime => "registration",
            Self::Late => "registration_and_ownership_tax",
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::OnTime => "Pay the registration fee before March 31",
            Self::Late => "Registration and ownership tax are due; surcharges apply",
        }
    }
}

/// Descriptive, category-specific fields kept alongside each record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObligationDetails {
    Emissions {
        folio: String,
        /// Semester the verification covers (1 = Jan–Jun, 2 = Jul–Dec).
        semester: u8,
        scheduled_for: Option<NaiveDate>,
        plate: Option<String>,
    },
    Insurance {
        insurer: String,
        policy_type: String,
        policy_number: String,
        sum_insured: f64,
        premium: f64,
        coverage_start: NaiveDate,
        landline: Option<String>,
        mobile: Option<String>,
    },
    RegistrationTax {
        registration_amount: f64,
        ownership_tax_amount: f64,
        total: f64,
        tier: TaxTier,
        cutoff: NaiveDate,
        notes: Option<String>,
    },
    PlateRegistration {
        plate: String,
        folio: String,
        payment_amount: f64,
    },
}

/// One concrete period of compliance for an (asset, category) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObligationRecord {
    pub id: RecordId,
    pub key: ObligationKey,
    pub issued_date: NaiveDate,
    /// Vigencia: the due date of the next renewal.
    pub effective_date: NaiveDate,
    pub params: RuleParams,
    pub details: ObligationDetails,
    pub evidence: Option<ArtifactRef>,
    pub is_active: bool,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}

impl ObligationRecord {
    pub fn category(&self) -> ObligationCategory {
        self.key.category
    }

    pub fn asset_id(&self) -> &AssetId {
        &self.key.asset_id
    }

    /// Date the rule engine evaluates from when projecting the next cycle.
    pub fn reference_date(&self) -> NaiveDate {
        match self.key.category {
            ObligationCategory::Emissions | ObligationCategory::RegistrationTax => {
                self.issued_date
            }
            ObligationCategory::Insurance | ObligationCategory::PlateRegistration => {
                self.effective_date
            }
        }
    }
}

/// Record content before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewObligationRecord {
    pub key: ObligationKey,
    pub issued_date: NaiveDate,
    pub effective_date: NaiveDate,
    pub params: RuleParams,
    pub details: ObligationDetails,
    pub evidence: Option<ArtifactRef>,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}

impl NewObligationRecord {
    pub fn into_active(self, id: RecordId) -> ObligationRecord {
        ObligationRecord {
            id,
            key: self.key,
            issued_date: self.issued_date,
            effective_date: self.effective_date,
            params: self.params,
            details: self.details,
            evidence: self.evidence,
            is_active: true,
            recorded_by: self.recorded_by,
            recorded_at: self.recorded_at,
        }
    }
}

/// Append-only snapshot of a superseded record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub sequence: u64,
    /// The record as it was when active, with `is_active` cleared.
    pub record: ObligationRecord,
    /// Where the record's evidence lives after archival.
    pub archived_evidence: Option<ArtifactRef>,
    pub rotated_at: DateTime<Utc>,
    pub rotated_by: String,
}
