use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::domain::ObligationCategory;

pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 4 * 60 * 60;
pub const DEFAULT_SCAN_PAGE_SIZE: usize = 200;

/// One value per obligation category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTable<T> {
    pub emissions: T,
    pub insurance: T,
    pub registration_tax: T,
    pub plate_registration: T,
}

impl<T: Copy> CategoryTable<T> {
    pub fn get(&self, category: ObligationCategory) -> T {
        match category {
            ObligationCategory::Emissions => self.emissions,
            ObligationCategory::Insurance => self.insurance,
            ObligationCategory::RegistrationTax => self.registration_tax,
            ObligationCategory::PlateRegistration => self.plate_registration,
        }
    }
}

impl<T> CategoryTable<T> {
    pub fn set(&mut self, category: ObligationCategory, value: T) {
        match category {
            ObligationCategory::Emissions => self.emissions = value,
            ObligationCategory::Insurance => self.insurance = value,
            ObligationCategory::RegistrationTax => self.registration_tax = value,
            ObligationCategory::PlateRegistration => self.plate_registration = value,
        }
    }
}

/// Timing knobs for alerting, renewal eligibility, and the periodic scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceConfig {
    /// Days before a due date during which alerts are raised.
    pub notice_window_days: CategoryTable<u32>,
    /// Days before expiry that a renewal is accepted; `None` means always.
    pub eligibility_window_days: CategoryTable<Option<u32>>,
    pub scan_interval: Duration,
    pub scan_page_size: usize,
}

impl ComplianceConfig {
    pub fn notice_days(&self, category: ObligationCategory) -> u32 {
        self.notice_window_days.get(category)
    }

    pub fn eligibility_days(&self, category: ObligationCategory) -> Option<u32> {
        self.eligibility_window_days.get(category)
    }
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            notice_window_days: CategoryTable {
                emissions: 60,
                insurance: 30,
                registration_tax: 90,
                plate_registration: 180,
            },
            eligibility_window_days: CategoryTable {
                emissions: None,
                insurance: Some(30),
                registration_tax: None,
                plate_registration: Some(180),
            },
            scan_interval: Duration::from_secs(DEFAULT_SCAN_INTERVAL_SECS),
            scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
        }
    }
}
