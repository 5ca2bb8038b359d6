use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::DriverId;
use crate::obligations::domain::AssetId;

/// Delivery address for a person receiving notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Contact {
    pub fn new(name: impl Into<String>, email: Option<&str>) -> Self {
        Self {
            name: name.into(),
            email: email.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverContact {
    pub driver_id: DriverId,
    pub contact: Contact,
}

/// Fleet master data consulted when resolving alert audiences.
pub trait AssetDirectory: Send + Sync {
    fn assigned_drivers(
        &self,
        asset_id: &AssetId,
        as_of: NaiveDate,
    ) -> Result<Vec<DriverContact>, DirectoryError>;
    fn admin_contacts(&self) -> Result<Vec<Contact>, DirectoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("asset directory unavailable: {0}")]
    Unavailable(String),
}

/// One driver's assignment to an asset over a closed or open date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub driver: DriverContact,
    pub from: NaiveDate,
    pub until: Option<NaiveDate>,
}

impl Assignment {
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.from && self.until.map_or(true, |until| date <= until)
    }
}

/// Fixed directory built at startup from configuration or fixtures.
#[derive(Debug, Clone, Default)]
pub struct StaticAssetDirectory {
    admins: Vec<Contact>,
    assignments: BTreeMap<AssetId, Vec<Assignment>>,
}

impl StaticAssetDirectory {
    pub fn new(admins: Vec<Contact>) -> Self {
        Self {
            admins,
            assignments: BTreeMap::new(),
        }
    }

    pub fn assign(
        mut self,
        asset_id: AssetId,
        driver: DriverContact,
        from: NaiveDate,
        until: Option<NaiveDate>,
    ) -> Self {
        self.assignments
            .entry(asset_id)
            .or_default()
            .push(Assignment {
                driver,
                from,
                until,
            });
        self
    }
}

impl AssetDirectory for StaticAssetDirectory {
    fn assigned_drivers(
        &self,
        asset_id: &AssetId,
        as_of: NaiveDate,
    ) -> Result<Vec<DriverContact>, DirectoryError> {
        let mut drivers: Vec<DriverContact> = self
            .assignments
            .get(asset_id)
            .into_iter()
            .flatten()
            .filter(|assignment| assignment.covers(as_of))
            .map(|assignment| assignment.driver.clone())
            .collect();
        drivers.sort_by(|a, b| a.driver_id.cmp(&b.driver_id));
        drivers.dedup_by(|a, b| a.driver_id == b.driver_id);
        Ok(drivers)
    }

    fn admin_contacts(&self) -> Result<Vec<Contact>, DirectoryError> {
        Ok(self.admins.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn driver(id: &str) -> DriverContact {
        DriverContact {
            driver_id: DriverId(id.to_string()),
            contact: Contact::new(format!("Driver {id}"), Some("driver@example.com")),
        }
    }

    #[test]
    fn assignments_respect_their_date_range() {
        let asset = AssetId("unit-1".to_string());
        let directory = StaticAssetDirectory::new(vec![Contact::new("Ops", None)])
            .assign(asset.clone(), driver("d-1"), date(2024, 1, 1), Some(date(2024, 12, 31)))
            .assign(asset.clone(), driver("d-2"), date(2025, 1, 1), None);

        let current = directory
            .assigned_drivers(&asset, date(2025, 6, 1))
            .expect("lookup");
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].driver_id, DriverId("d-2".to_string()));

        let past = directory
            .assigned_drivers(&asset, date(2024, 12, 31))
            .expect("lookup");
        assert_eq!(past[0].driver_id, DriverId("d-1".to_string()));

        assert!(directory
            .assigned_drivers(&AssetId("unknown".to_string()), date(2025, 1, 1))
            .expect("lookup")
            .is_empty());
        assert_eq!(directory.admin_contacts().expect("admins").len(), 1);
    }

    #[test]
    fn overlapping_assignments_are_deduplicated() {
        let asset = AssetId("unit-2".to_string());
        let directory = StaticAssetDirectory::default()
            .assign(asset.clone(), driver("d-1"), date(2024, 1, 1), None)
            .assign(asset.clone(), driver("d-1"), date(2025, 1, 1), None);

        let drivers = directory
            .assigned_drivers(&asset, date(2025, 3, 1))
            .expect("lookup");
        assert_eq!(drivers.len(), 1);
    }
}
