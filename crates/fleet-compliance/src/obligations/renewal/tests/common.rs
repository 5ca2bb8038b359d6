use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use chrono::NaiveDate;

use crate::obligations::alerts::{DeliveryError, MemoryAlertStore, Notice, Notifier};
use crate::obligations::archive::{
    ArchiveError, ArchiveOutcome, ArtifactRef, DocumentArchive, EvidenceUpload,
};
use crate::obligations::config::ComplianceConfig;
use crate::obligations::domain::{
    AssetId, HistoryEntry, ObligationKey, ObligationRecord, RecordId,
};
use crate::obligations::renewal::{RenewalRequest, RenewalService, RenewalSubmission};
use crate::obligations::store::{
    ActiveCursor, MemoryObligationStore, ObligationStore, Page, PageRequest, RotationRequest,
    StoreError,
};

pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub(super) fn asset() -> AssetId {
    AssetId("unit-42".to_string())
}

pub(super) fn insurance(coverage_start: NaiveDate, vigencia: NaiveDate) -> RenewalSubmission {
    RenewalSubmission::Insurance {
        insurer: "Seguros Atlas".to_string(),
        policy_type: "Amplia".to_string(),
        policy_number: format!("POL-{vigencia}"),
        sum_insured: 350_000.0,
        premium: 12_400.0,
        coverage_start,
        vigencia,
        landline: None,
        mobile: Some("555-0101".to_string()),
    }
}

pub(super) fn plate(issued_on: NaiveDate, vigencia: NaiveDate) -> RenewalSubmission {
    RenewalSubmission::PlateRegistration {
        plate: "JKL-4413".to_string(),
        folio: format!("PL-{issued_on}"),
        issued_on,
        vigencia,
        payment_amount: 920.0,
    }
}

pub(super) fn registration_tax(period: i32, paid_on: NaiveDate) -> RenewalSubmission {
    RenewalSubmission::RegistrationTax {
        period,
        paid_on,
        registration_amount: 740.0,
        ownership_tax_amount: 3_100.0,
        notes: None,
    }
}

pub(super) fn emissions(verified_on: NaiveDate, exemption: &str) -> RenewalSubmission {
    RenewalSubmission::Emissions {
        folio: format!("VER-{verified_on}"),
        verified_on,
        exemption: exemption.to_string(),
        color_band: None,
        plate: Some("JKL-4413".to_string()),
    }
}

pub(super) fn pdf(label: &str) -> EvidenceUpload {
    EvidenceUpload::new(label.as_bytes().to_vec(), mime::APPLICATION_PDF)
        .named(format!("{label}.pdf"))
}

pub(super) fn request(submission: RenewalSubmission, evidence: Option<EvidenceUpload>) -> RenewalRequest {
    RenewalRequest {
        asset_id: asset(),
        acting_user: "fleet.admin".to_string(),
        submission,
        evidence,
    }
}

pub(super) type TestService = RenewalService<MemoryObligationStore, MemoryArchive, MemoryAlertStore>;

pub(super) fn build_service() -> (
    TestService,
    Arc<MemoryObligationStore>,
    Arc<MemoryArchive>,
    Arc<MemoryAlertStore>,
) {
    let store = Arc::new(MemoryObligationStore::new());
    let archive = Arc::new(MemoryArchive::default());
    let alerts = Arc::new(MemoryAlertStore::new());
    let service = RenewalService::new(
        store.clone(),
        archive.clone(),
        alerts.clone(),
        ComplianceConfig::default(),
    );
    (service, store, archive, alerts)
}

#[derive(Debug, Default)]
struct ArchiveState {
    next: u64,
    active: HashMap<ObligationKey, ArtifactRef>,
    history: HashMap<ObligationKey, Vec<ArtifactRef>>,
}

/// In-memory archive with switchable failures.
#[derive(Debug, Default)]
pub(super) struct MemoryArchive {
    state: Mutex<ArchiveState>,
    pub(super) fail_store: AtomicBool,
    pub(super) fail_archive: AtomicBool,
    pub(super) fail_restore: AtomicBool,
}

impl MemoryArchive {
    pub(super) fn active(&self, key: &ObligationKey) -> Option<ArtifactRef> {
        self.state
            .lock()
            .expect("archive mutex poisoned")
            .active
            .get(key)
            .cloned()
    }

    pub(super) fn history(&self, key: &ObligationKey) -> Vec<ArtifactRef> {
        self.state
            .lock()
            .expect("archive mutex poisoned")
            .history
            .get(key)
            .cloned()
            .unwrap_or_default()
    }
}

impl DocumentArchive for MemoryArchive {
    fn store_active(
        &self,
        key: &ObligationKey,
        upload: &EvidenceUpload,
    ) -> Result<ArtifactRef, ArchiveError> {
        if self.fail_store.load(Ordering::SeqCst) {
            return Err(ArchiveError::ArchiveFailed {
                key: key.clone(),
                reason: "disk full".to_string(),
            });
        }
        let mut state = self.state.lock().expect("archive mutex poisoned");
        if state.active.contains_key(key) {
            return Err(ArchiveError::ActiveExists { key: key.clone() });
        }
        state.next += 1;
        let artifact = ArtifactRef {
            location: format!("active/{key}/{}.pdf", state.next),
            content_type: upload.content_type.essence_str().to_string(),
            file_name: upload.file_name.clone(),
        };
        state.active.insert(key.clone(), artifact.clone());
        Ok(artifact)
    }

    fn archive_active(&self, key: &ObligationKey) -> Result<ArchiveOutcome, ArchiveError> {
        if self.fail_archive.load(Ordering::SeqCst) {
            return Err(ArchiveError::ArchiveFailed {
                key: key.clone(),
                reason: "permission denied".to_string(),
            });
        }
        let mut state = self.state.lock().expect("archive mutex poisoned");
        let Some(mut artifact) = state.active.remove(key) else {
            return Ok(ArchiveOutcome::NoneExisted);
        };
        artifact.location = artifact.location.replacen("active/", "history/", 1);
        state
            .history
            .entry(key.clone())
            .or_default()
            .push(artifact.clone());
        Ok(ArchiveOutcome::Archived(artifact))
    }

    fn discard_active(&self, key: &ObligationKey) -> Result<(), ArchiveError> {
        self.state
            .lock()
            .expect("archive mutex poisoned")
            .active
            .remove(key);
        Ok(())
    }

    fn restore_archived(
        &self,
        key: &ObligationKey,
        artifact: &ArtifactRef,
    ) -> Result<ArtifactRef, ArchiveError> {
        if self.fail_restore.load(Ordering::SeqCst) {
            return Err(ArchiveError::ArchiveFailed {
                key: key.clone(),
                reason: "history volume offline".to_string(),
            });
        }
        let mut state = self.state.lock().expect("archive mutex poisoned");
        if let Some(history) = state.history.get_mut(key) {
            history.retain(|entry| entry != artifact);
        }
        let mut restored = artifact.clone();
        restored.location = restored.location.replacen("history/", "active/", 1);
        state.active.insert(key.clone(), restored.clone());
        Ok(restored)
    }
}

/// Archive that parks inside `archive_active` until released, so a second
/// submission can observe the first one in flight.
pub(super) struct GatedArchive {
    pub(super) inner: MemoryArchive,
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl GatedArchive {
    pub(super) fn new() -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let archive = Self {
            inner: MemoryArchive::default(),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };
        (archive, entered_rx, release_tx)
    }
}

impl DocumentArchive for GatedArchive {
    fn store_active(
        &self,
        key: &ObligationKey,
        upload: &EvidenceUpload,
    ) -> Result<ArtifactRef, ArchiveError> {
        self.inner.store_active(key, upload)
    }

    fn archive_active(&self, key: &ObligationKey) -> Result<ArchiveOutcome, ArchiveError> {
        let _ = self.entered.lock().expect("gate mutex poisoned").send(());
        let _ = self.release.lock().expect("gate mutex poisoned").recv();
        self.inner.archive_active(key)
    }

    fn discard_active(&self, key: &ObligationKey) -> Result<(), ArchiveError> {
        self.inner.discard_active(key)
    }

    fn restore_archived(
        &self,
        key: &ObligationKey,
        artifact: &ArtifactRef,
    ) -> Result<ArtifactRef, ArchiveError> {
        self.inner.restore_archived(key, artifact)
    }
}

/// Store whose commits can be switched off to simulate a failed transaction.
#[derive(Debug, Default)]
pub(super) struct FlakyStore {
    pub(super) inner: MemoryObligationStore,
    pub(super) fail_rotate: AtomicBool,
}

impl ObligationStore for FlakyStore {
    fn get_active(&self, key: &ObligationKey) -> Result<Option<ObligationRecord>, StoreError> {
        self.inner.get_active(key)
    }

    fn rotate(&self, request: RotationRequest) -> Result<RecordId, StoreError> {
        if self.fail_rotate.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("transaction aborted".to_string()));
        }
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
        self.inner.list_active(cursor)
    }

    fn remove_asset(&self, asset_id: &AssetId) -> Result<usize, StoreError> {
        self.inner.remove_asset(asset_id)
    }
}

/// Notifier that records every notice it is handed.
#[derive(Debug, Default)]
pub(super) struct RecordingNotifier {
    sent: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub(super) fn sent(&self) -> Vec<Notice> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, notice: &Notice) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notice.clone());
        Ok(())
    }
}
