//! Integration scenarios for the periodic alert scan.
//!
//! Records are installed through the renewal service so the scan sees exactly
//! what production writes, then the scanner, delivery queue, and scheduler are
//! driven through their public surfaces.

mod common {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc, Mutex};

    use chrono::{Datelike, NaiveDate};
    use tempfile::TempDir;

    use fleet_compliance::obligations::alerts::{
        AlertScanner, Contact, DeliveryError, DriverContact, DriverId, MemoryAlertStore, Notice,
        Notifier, StaticAssetDirectory,
    };
    use fleet_compliance::obligations::archive::FsDocumentArchive;
    use fleet_compliance::obligations::config::ComplianceConfig;
    use fleet_compliance::obligations::domain::{
        AssetId, HistoryEntry, ObligationKey, ObligationRecord, RecordId,
    };
    use fleet_compliance::obligations::renewal::{
        RenewalRequest, RenewalService, RenewalSubmission,
    };
    use fleet_compliance::obligations::store::{
        ActiveCursor, MemoryObligationStore, ObligationStore, Page, PageRequest, RotationRequest,
        StoreError,
    };

    pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    pub(super) fn asset(id: &str) -> AssetId {
        AssetId(id.to_string())
    }

    pub(super) fn driver(id: &str) -> DriverContact {
        DriverContact {
            driver_id: DriverId(id.to_string()),
            contact: Contact::new(format!("Driver {id}"), Some("driver@fleet.example")),
        }
    }

    pub(super) fn directory() -> StaticAssetDirectory {
        StaticAssetDirectory::new(vec![Contact::new(
            "Fleet Desk",
            Some("fleet@fleet.example"),
        )])
        .assign(asset("unit-7"), driver("drv-1"), date(2025, 1, 1), None)
        .assign(
            asset("unit-7"),
            driver("drv-2"),
            date(2024, 1, 1),
            Some(date(2024, 12, 31)),
        )
    }

    pub(super) fn insurance(vigencia: NaiveDate) -> RenewalSubmission {
        RenewalSubmission::Insurance {
            insurer: "Seguros Atlas".to_string(),
            policy_type: "Amplia".to_string(),
            policy_number: format!("POL-{vigencia}"),
            sum_insured: 420_000.0,
            premium: 11_800.0,
            coverage_start: vigencia
                .with_year(vigencia.year() - 1)
                .expect("valid coverage start"),
            vigencia,
            landline: None,
            mobile: None,
        }
    }

    pub(super) struct Fleet {
        _dir: TempDir,
        pub(super) store: Arc<MemoryObligationStore>,
        pub(super) alerts: Arc<MemoryAlertStore>,
        pub(super) renewals:
            RenewalService<MemoryObligationStore, FsDocumentArchive, MemoryAlertStore>,
    }

    impl Fleet {
        pub(super) fn new() -> Self {
            let dir = TempDir::new().expect("tempdir");
            let store = Arc::new(MemoryObligationStore::new());
            let alerts = Arc::new(MemoryAlertStore::new());
            let renewals = RenewalService::new(
                store.clone(),
                Arc::new(FsDocumentArchive::new(dir.path())),
                alerts.clone(),
                ComplianceConfig::default(),
            );
            Self {
                _dir: dir,
                store,
                alerts,
                renewals,
            }
        }

        pub(super) fn register(&self, asset_id: &str, submission: RenewalSubmission, on: NaiveDate) {
            self.renewals
                .submit_renewal(
                    RenewalRequest {
                        asset_id: asset(asset_id),
                        acting_user: "fleet.admin".to_string(),
                        submission,
                        evidence: None,
                    },
                    on,
                )
                .expect("registration accepted");
        }

        pub(super) fn scanner(
            &self,
            config: ComplianceConfig,
        ) -> AlertScanner<MemoryObligationStore, MemoryAlertStore, StaticAssetDirectory> {
            AlertScanner::new(
                self.store.clone(),
                self.alerts.clone(),
                Arc::new(directory()),
                config,
            )
        }
    }

    /// Store whose listing parks until the test releases it.
    pub(super) struct ParkedStore {
        pub(super) inner: MemoryObligationStore,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl ParkedStore {
        pub(super) fn new() -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
            let (entered_tx, entered_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel();
            (
                Self {
                    inner: MemoryObligationStore::new(),
                    entered: Mutex::new(entered_tx),
                    release: Mutex::new(release_rx),
                },
                entered_rx,
                release_tx,
            )
        }
    }

    impl ObligationStore for ParkedStore {
        fn get_active(&self, key: &ObligationKey) -> Result<Option<ObligationRecord>, StoreError> {
            self.inner.get_active(key)
        }

        fn rotate(&self, request: RotationRequest) -> Result<RecordId, StoreError> {
            self.inner.rotate(request)
        }

        fn list_history(
            &self,
            key: &ObligationKey,
            page: PageRequest,
        ) -> Result<Page<HistoryEntry>, StoreError> {
            self.inner.list_history(key, page)
        }

        fn list_active(
            &self,
            cursor: &ActiveCursor,
        ) -> Result<Page<ObligationRecord, ActiveCursor>, StoreError> {
            let _ = self.entered.lock().expect("gate mutex poisoned").send(());
            let _ = self.release.lock().expect("gate mutex poisoned").recv();
            self.inner.list_active(cursor)
        }

        fn remove_asset(&self, asset_id: &AssetId) -> Result<usize, StoreError> {
            self.inner.remove_asset(asset_id)
        }
    }

    /// Fails the first `failures` sends, then records the rest.
    #[derive(Default)]
    pub(super) struct FlakyNotifier {
        pub(super) failures: AtomicUsize,
        pub(super) delivered: Mutex<Vec<Notice>>,
    }

    impl Notifier for FlakyNotifier {
        fn send(&self, notice: &Notice) -> Result<(), DeliveryError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(DeliveryError::DeliveryFailed("smtp timeout".to_string()));
            }
            self.delivered
                .lock()
                .expect("notifier mutex poisoned")
                .push(notice.clone());
            Ok(())
        }
    }
}

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fleet_compliance::obligations::alerts::{
    AlertFilter, AlertScanner, AlertStore, AudienceKey, DeliveryQueue, DriverId,
    MemoryAlertStore, ScanError, ScanScheduler, ShutdownSignal, StaticAssetDirectory,
    TEMPLATE_OBLIGATION_DUE,
};
use fleet_compliance::obligations::config::ComplianceConfig;
use fleet_compliance::obligations::domain::ObligationCategory;
use fleet_compliance::obligations::renewal::RenewalRequest;
use fleet_compliance::obligations::store::ObligationStore;

use common::*;

#[test]
fn scan_is_idempotent_while_alerts_stay_pending() {
    let fleet = Fleet::new();
    fleet.register("unit-7", insurance(date(2025, 7, 1)), date(2024, 7, 1));
    let scanner = fleet.scanner(ComplianceConfig::default());
    let shutdown = ShutdownSignal::new();

    let first = scanner.scan(date(2025, 6, 10), &shutdown).expect("scan");
    assert_eq!(first.examined, 1);
    assert_eq!(first.due, 1);
    assert_eq!(first.alerts_created, 2, "admin plus the one current driver");

    let second = scanner.scan(date(2025, 6, 11), &shutdown).expect("rescan");
    assert_eq!(second.alerts_created, 0);
    assert_eq!(second.alerts_skipped, 2);

    let pending = fleet
        .alerts
        .list(&AlertFilter::default().pending())
        .expect("list");
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|alert| alert.due_date == date(2025, 7, 1)));
}

#[test]
fn notice_window_boundary_is_inclusive() {
    let fleet = Fleet::new();
    fleet.register("unit-9", insurance(date(2025, 7, 1)), date(2024, 7, 1));
    let scanner = fleet.scanner(ComplianceConfig::default());
    let shutdown = ShutdownSignal::new();

    let outside = scanner.scan(date(2025, 5, 31), &shutdown).expect("scan");
    assert_eq!(outside.due, 0);
    assert_eq!(outside.alerts_created, 0);

    let edge = scanner.scan(date(2025, 6, 1), &shutdown).expect("scan");
    assert_eq!(edge.due, 1);
    assert_eq!(edge.alerts_created, 1, "unit-9 has no assigned driver");
}

#[test]
fn renewal_completes_alerts_and_rescan_stays_quiet() {
    let fleet = Fleet::new();
    fleet.register("unit-7", insurance(date(2025, 7, 1)), date(2024, 7, 1));
    let scanner = fleet.scanner(ComplianceConfig::default());
    let shutdown = ShutdownSignal::new();
    scanner.scan(date(2025, 6, 10), &shutdown).expect("scan");

    let receipt = fleet
        .renewals
        .submit_renewal(
            RenewalRequest {
                asset_id: asset("unit-7"),
                acting_user: "fleet.admin".to_string(),
                submission: insurance(date(2026, 7, 1)),
                evidence: None,
            },
            date(2025, 6, 12),
        )
        .expect("renewal");
    assert_eq!(receipt.resolved_alerts.len(), 2);

    let after = scanner.scan(date(2025, 6, 13), &shutdown).expect("scan");
    assert_eq!(after.due, 0);
    assert_eq!(after.alerts_created, 0);
    assert!(fleet
        .alerts
        .list(&AlertFilter::default().pending())
        .expect("list")
        .is_empty());
}

#[test]
fn drivers_only_see_their_own_alerts() {
    let fleet = Fleet::new();
    fleet.register("unit-7", insurance(date(2025, 7, 1)), date(2024, 7, 1));
    fleet.register("unit-9", insurance(date(2025, 7, 1)), date(2024, 7, 1));
    fleet
        .scanner(ComplianceConfig::default())
        .scan(date(2025, 6, 10), &ShutdownSignal::new())
        .expect("scan");

    let admin = fleet
        .alerts
        .list(&AlertFilter::for_audience(AudienceKey::Admin))
        .expect("admin list");
    assert_eq!(admin.len(), 3);

    let current = fleet
        .alerts
        .list(&AlertFilter::for_audience(AudienceKey::Driver(DriverId(
            "drv-1".to_string(),
        ))))
        .expect("driver list");
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].asset_id, asset("unit-7"));

    let former = fleet
        .alerts
        .list(&AlertFilter::for_audience(AudienceKey::Driver(DriverId(
            "drv-2".to_string(),
        ))))
        .expect("driver list");
    assert!(former.is_empty(), "expired assignment receives nothing");
}

#[test]
fn scan_pages_through_every_active_record() {
    let fleet = Fleet::new();
    for unit in ["a-1", "a-2", "a-3", "a-4", "a-5"] {
        fleet.register(unit, insurance(date(2025, 7, 1)), date(2024, 7, 1));
    }
    let config = ComplianceConfig {
        scan_page_size: 2,
        ..ComplianceConfig::default()
    };

    let report = fleet
        .scanner(config)
        .scan(date(2025, 6, 20), &ShutdownSignal::new())
        .expect("scan");
    assert_eq!(report.examined, 5);
    assert_eq!(report.due, 5);
    assert_eq!(report.alerts_created, 5);
    assert!(!report.interrupted);
}

#[test]
fn triggered_shutdown_interrupts_the_scan() {
    let fleet = Fleet::new();
    fleet.register("unit-7", insurance(date(2025, 7, 1)), date(2024, 7, 1));
    let shutdown = ShutdownSignal::new();
    shutdown.trigger();

    let report = fleet
        .scanner(ComplianceConfig::default())
        .scan(date(2025, 6, 20), &shutdown)
        .expect("scan");
    assert!(report.interrupted);
    assert_eq!(report.examined, 0);
    assert!(fleet
        .alerts
        .list(&AlertFilter::default())
        .expect("list")
        .is_empty());
}

#[test]
fn overlapping_scans_are_rejected() {
    let (store, entered, release) = ParkedStore::new();
    let scanner = Arc::new(AlertScanner::new(
        Arc::new(store),
        Arc::new(MemoryAlertStore::new()),
        Arc::new(StaticAssetDirectory::default()),
        ComplianceConfig::default(),
    ));

    let background = {
        let scanner = scanner.clone();
        thread::spawn(move || scanner.scan(date(2025, 6, 1), &ShutdownSignal::new()))
    };
    entered.recv().expect("first scan is listing records");
    assert!(scanner.is_running());

    match scanner.scan(date(2025, 6, 1), &ShutdownSignal::new()) {
        Err(ScanError::AlreadyRunning) => {}
        other => panic!("expected already running, got {other:?}"),
    }

    release.send(()).expect("release listing");
    background
        .join()
        .expect("thread joins")
        .expect("first scan completes");
    assert!(!scanner.is_running());
}

#[test]
fn failed_notices_are_retried_after_requeue() {
    let fleet = Fleet::new();
    fleet.register("unit-7", insurance(date(2025, 7, 1)), date(2024, 7, 1));
    let notifier = Arc::new(FlakyNotifier::default());
    notifier.failures.store(2, Ordering::SeqCst);
    let (queue, mut worker) = DeliveryQueue::channel(8, notifier.clone());
    let scanner = fleet
        .scanner(ComplianceConfig::default())
        .with_delivery(queue.clone());

    scanner
        .scan(date(2025, 6, 10), &ShutdownSignal::new())
        .expect("scan");
    assert_eq!(worker.drain_pending(), 2);
    let stats = queue.stats();
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.awaiting_retry, 2);

    assert_eq!(queue.requeue_failed(), 2);
    assert_eq!(worker.drain_pending(), 2);
    let stats = queue.stats();
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.awaiting_retry, 0);

    let delivered = notifier.delivered.lock().expect("notifier mutex poisoned");
    assert!(delivered
        .iter()
        .all(|notice| notice.template == TEMPLATE_OBLIGATION_DUE && notice.attempts == 2));
    assert!(delivered
        .iter()
        .any(|notice| notice.audience == AudienceKey::Admin && !notice.recipients.is_empty()));
}

#[tokio::test]
async fn scheduler_runs_scans_until_stopped() {
    let fleet = Fleet::new();
    fleet.register("unit-9", insurance(date(2025, 7, 1)), date(2024, 7, 1));
    let alerts = fleet.alerts.clone();
    let scanner = Arc::new(fleet.scanner(ComplianceConfig::default()));

    let handle = ScanScheduler::start_with_clock(scanner, Duration::from_millis(20), || {
        date(2025, 6, 15)
    });

    let mut created = false;
    for _ in 0..100 {
        if !alerts.list(&AlertFilter::default()).expect("list").is_empty() {
            created = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let signal = handle.signal();
    handle.stop().await;

    assert!(created, "scheduler raised the pending alert");
    assert!(signal.is_triggered());
    assert_eq!(
        alerts
            .list(&AlertFilter::default())
            .expect("list")
            .iter()
            .filter(|alert| alert.category == ObligationCategory::Insurance)
            .count(),
        1
    );
}

#[test]
fn removing_an_asset_drops_it_from_future_scans() {
    let fleet = Fleet::new();
    fleet.register("unit-7", insurance(date(2025, 7, 1)), date(2024, 7, 1));
    fleet.register("unit-9", insurance(date(2025, 7, 1)), date(2024, 7, 1));
    assert_eq!(fleet.store.remove_asset(&asset("unit-7")).expect("remove"), 1);

    let report = fleet
        .scanner(ComplianceConfig::default())
        .scan(date(2025, 6, 10), &ShutdownSignal::new())
        .expect("scan");
    assert_eq!(report.examined, 1);
    assert!(fleet
        .alerts
        .list(&AlertFilter::default())
        .expect("list")
        .iter()
        .all(|alert| alert.asset_id == asset("unit-9")));
}
