//! Renewal submissions: eligibility, evidence rotation, and record rotation.

pub mod service;
pub mod submission;

#[cfg(test)]
mod tests;

pub use service::{EligibilityView, RenewalError, RenewalReceipt, RenewalService};
pub use submission::{RenewalRequest, RenewalSubmission};
