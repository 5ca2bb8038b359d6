use chrono::NaiveDate;
use fleet_compliance::obligations::alerts::{
    Contact, DeliveryError, Notice, Notifier, StaticAssetDirectory,
};
use fleet_compliance::obligations::domain::ObligationCategory;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Notifier that writes each notice to the log instead of a mail transport.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notice: &Notice) -> Result<(), DeliveryError> {
        info!(
            template = %notice.template,
            audience = %notice.audience,
            recipients = notice.recipients.len(),
            asset = %notice.asset_id,
            category = %notice.category,
            due = notice.details.get("due").map(String::as_str).unwrap_or("-"),
            "notice dispatched"
        );
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<Notice>>>,
}

impl Notifier for InMemoryNotifier {
    fn send(&self, notice: &Notice) -> Result<(), DeliveryError> {
        let mut guard = self
            .sent
            .lock()
            .map_err(|_| DeliveryError::DeliveryFailed("notifier mutex poisoned".to_string()))?;
        guard.push(notice.clone());
        Ok(())
    }
}

impl InMemoryNotifier {
    pub(crate) fn sent(&self) -> Vec<Notice> {
        self.sent
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

/// Directory used until fleet master data is wired in: one admin desk, no
/// driver assignments.
pub(crate) fn default_directory() -> StaticAssetDirectory {
    StaticAssetDirectory::new(vec![Contact::new("Fleet administration", None)])
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_category(raw: &str) -> Result<ObligationCategory, String> {
    let slug = raw.trim().to_ascii_lowercase().replace('-', "_");
    ObligationCategory::from_slug(&slug).ok_or_else(|| {
        let known: Vec<&str> = ObligationCategory::ordered()
            .iter()
            .map(|category| category.slug())
            .collect();
        format!("unknown category '{raw}' (expected one of {})", known.join(", "))
    })
}
