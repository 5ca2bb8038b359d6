use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::directory::{AssetDirectory, Contact};
use super::domain::{alert_message, AlertDraft, AlertInsert, AudienceKey};
use super::notifier::{DeliveryQueue, Notice, TEMPLATE_OBLIGATION_DUE};
use super::scheduler::{ScanJob, ShutdownSignal};
use super::store::AlertStore;
use crate::obligations::config::ComplianceConfig;
use crate::obligations::domain::ObligationRecord;
use crate::obligations::rules::RuleEngine;
use crate::obligations::store::{ActiveCursor, ObligationStore, StoreError};

/// Counters for one scan run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub examined: usize,
    pub due: usize,
    pub alerts_created: usize,
    pub alerts_skipped: usize,
    pub failures: usize,
    pub interrupted: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("an alert scan is already running")]
    AlreadyRunning,
    #[error("could not enumerate active obligations: {0}")]
    Store(#[from] StoreError),
}

/// Walks every active record and raises pending alerts for those inside
/// their notice window.
pub struct AlertScanner<S, A, D> {
    store: Arc<S>,
    alerts: Arc<A>,
    directory: Arc<D>,
    engine: RuleEngine,
    config: ComplianceConfig,
    delivery: Option<DeliveryQueue>,
    running: AtomicBool,
}

struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<S, A, D> AlertScanner<S, A, D>
where
    S: ObligationStore + 'static,
    A: AlertStore + 'static,
    D: AssetDirectory + 'static,
{
    pub fn new(store: Arc<S>, alerts: Arc<A>, directory: Arc<D>, config: ComplianceConfig) -> Self {
        Self {
            store,
            alerts,
            directory,
            engine: RuleEngine::new(),
            config,
            delivery: None,
            running: AtomicBool::new(false),
        }
    }

    pub fn with_delivery(mut self, queue: DeliveryQueue) -> Self {
        self.delivery = Some(queue);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn scan(
        &self,
        today: NaiveDate,
        shutdown: &ShutdownSignal,
    ) -> Result<ScanReport, ScanError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ScanError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);

        let admins = match self.directory.admin_contacts() {
            Ok(contacts) => contacts,
            Err(err) => {
                warn!(error = %err, "admin contacts unavailable; alerts will be stored without recipients");
                Vec::new()
            }
        };

        let mut report = ScanReport::default();
        let mut page = Some(ActiveCursor::first(self.config.scan_page_size.max(1)));
        'pages: while let Some(cursor) = page {
            let listing = self.store.list_active(&cursor)?;
            for record in &listing.items {
                if shutdown.is_triggered() {
                    report.interrupted = true;
                    break 'pages;
                }
                report.examined += 1;
                self.scan_record(record, today, &admins, &mut report);
            }
            page = listing.next;
        }

        debug!(
            today = %today,
            examined = report.examined,
            created = report.alerts_created,
            "alert scan complete"
        );
        Ok(report)
    }

    fn scan_record(
        &self,
        record: &ObligationRecord,
        today: NaiveDate,
        admins: &[Contact],
        report: &mut ScanReport,
    ) {
        let asset = record.asset_id();
        let category = record.category();

        let due = match self.engine.next_due_for(record) {
            Ok(due) => due,
            Err(err) => {
                report.failures += 1;
                warn!(asset = %asset, category = %category, error = %err, "skipping record with invalid rule parameters");
                return;
            }
        };

        let notice_days = i64::from(self.config.notice_days(category));
        let horizon = today
            .checked_add_signed(Duration::days(notice_days))
            .unwrap_or(NaiveDate::MAX);
        if horizon < due {
            return;
        }
        report.due += 1;

        let mut audiences = vec![(AudienceKey::Admin, admins.to_vec())];
        match self.directory.assigned_drivers(asset, today) {
            Ok(drivers) => audiences.extend(
                drivers
                    .into_iter()
                    .map(|driver| (AudienceKey::Driver(driver.driver_id), vec![driver.contact])),
            ),
            Err(err) => {
                report.failures += 1;
                warn!(asset = %asset, category = %category, error = %err, "driver lookup failed; alerting admins only");
            }
        }

        let message = alert_message(asset, &record.params, due, today);
        for (audience, recipients) in audiences {
            let draft = AlertDraft {
                asset_id: asset.clone(),
                category,
                audience: audience.clone(),
                due_date: due,
                message: message.clone(),
                created_at: Utc::now(),
            };
            match self.alerts.create_if_absent(draft) {
                Ok(AlertInsert::Created(alert)) => {
                    report.alerts_created += 1;
                    debug!(asset = %asset, category = %category, due = %due, audience = %audience, alert = %alert.id, "alert created");
                    let mut notice =
                        Notice::new(TEMPLATE_OBLIGATION_DUE, audience, asset.clone(), category)
                            .detail("due", due)
                            .detail("message", &alert.message);
                    notice.alert_id = Some(alert.id);
                    notice.recipients = recipients;
                    self.dispatch(notice);
                }
                Ok(AlertInsert::AlreadyPending(_)) => report.alerts_skipped += 1,
                Err(err) => {
                    report.failures += 1;
                    warn!(asset = %asset, category = %category, audience = %audience, error = %err, "failed to record alert");
                }
            }
        }
    }

    fn dispatch(&self, notice: Notice) {
        let Some(queue) = &self.delivery else {
            return;
        };
        if let Err(err) = queue.enqueue(notice) {
            warn!(error = %err, "alert notice not queued");
        }
    }
}

impl<S, A, D> ScanJob for AlertScanner<S, A, D>
where
    S: ObligationStore + 'static,
    A: AlertStore + 'static,
    D: AssetDirectory + 'static,
{
    fn run_scan(&self, today: NaiveDate, shutdown: &ShutdownSignal) -> Result<ScanReport, ScanError> {
        self.scan(today, shutdown)
    }
}
