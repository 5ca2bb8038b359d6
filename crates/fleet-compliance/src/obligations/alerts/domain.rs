use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::obligations::domain::{AssetId, ObligationCategory, RuleParams};
use crate::obligations::rules::tax;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlertId(pub u64);

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "alert-{:06}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DriverId(pub String);

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who an alert is addressed to. Fleet admins share one audience.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudienceKey {
    Admin,
    Driver(DriverId),
}

impl fmt::Display for AudienceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => f.write_str("admin"),
            Self::Driver(id) => write!(f, "driver:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Pending,
    /// Terminal.
    Completed,
}

impl AlertState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: AlertId,
    pub asset_id: AssetId,
    pub category: ObligationCategory,
    pub audience: AudienceKey,
    pub state: AlertState,
    pub due_date: NaiveDate,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AlertRecord {
    pub fn is_pending(&self) -> bool {
        self.state == AlertState::Pending
    }
}

/// Pending alert content before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertDraft {
    pub asset_id: AssetId,
    pub category: ObligationCategory,
    pub audience: AudienceKey,
    pub due_date: NaiveDate,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertInsert {
    Created(AlertRecord),
    AlreadyPending(AlertId),
}

/// Listing filter. An admin audience, or none, sees every alert; a driver
/// audience sees only alerts addressed to that driver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertFilter {
    pub audience: Option<AudienceKey>,
    pub asset_id: Option<AssetId>,
    pub category: Option<ObligationCategory>,
    pub state: Option<AlertState>,
}

impl AlertFilter {
    pub fn for_audience(audience: AudienceKey) -> Self {
        Self {
            audience: Some(audience),
            ..Self::default()
        }
    }

    pub fn pending(mut self) -> Self {
        self.state = Some(AlertState::Pending);
        self
    }

    pub fn matches(&self, alert: &AlertRecord) -> bool {
        let audience_ok = match &self.audience {
            None | Some(AudienceKey::Admin) => true,
            Some(driver) => &alert.audience == driver,
        };
        audience_ok
            && self.asset_id.as_ref().map_or(true, |id| &alert.asset_id == id)
            && self.category.map_or(true, |category| alert.category == category)
            && self.state.map_or(true, |state| alert.state == state)
    }
}

/// Human-readable alert text for an obligation due on `due`.
pub fn alert_message(
    asset_id: &AssetId,
    params: &RuleParams,
    due: NaiveDate,
    today: NaiveDate,
) -> String {
    match params {
        RuleParams::Emissions { .. } => {
            format!("Vehicle {asset_id} requires emissions verification before {due}")
        }
        RuleParams::Insurance { .. } => {
            format!("Insurance policy for vehicle {asset_id} expires on {due}")
        }
        RuleParams::PlateRegistration { .. } => {
            format!("License plate for vehicle {asset_id} expires on {due}")
        }
        RuleParams::RegistrationTax { period } => format!(
            "Vehicle {asset_id} registration for {}: {}",
            period.saturating_add(1),
            tax::tier_on(today).message()
        ),
    }
}
