//! Recurring vehicle obligations: due-date rules, active/history records,
//! evidence archiving, renewals, and the alerting loop that watches them.

pub mod alerts;
pub mod archive;
pub mod config;
pub mod domain;
pub mod renewal;
pub mod rules;
pub mod store;

pub use config::{CategoryTable, ComplianceConfig};
pub use domain::{
    AssetId, HistoryEntry, ObligationCategory, ObligationDetails, ObligationKey,
    ObligationRecord, RecordId, RuleParams, TaxTier,
};
pub use renewal::{RenewalError, RenewalRequest, RenewalService, RenewalSubmission};
pub use rules::{RenewalWindow, RuleEngine, RuleError};
pub use store::{MemoryObligationStore, ObligationStore, StoreError};
