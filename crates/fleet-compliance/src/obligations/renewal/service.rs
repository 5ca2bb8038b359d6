use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::submission::{RenewalRequest, RenewalSubmission};
use crate::obligations::alerts::{
    AlertId, AlertStore, AudienceKey, DeliveryQueue, Notice, TEMPLATE_RENEWAL_CONFIRMED,
};
use crate::obligations::archive::{
    extension_for, ArchiveError, ArchiveOutcome, ArtifactRef, DocumentArchive,
};
use crate::obligations::config::ComplianceConfig;
use crate::obligations::domain::{
    AssetId, HistoryEntry, NewObligationRecord, ObligationCategory, ObligationKey,
    ObligationRecord, RecordId, RuleParams,
};
use crate::obligations::rules::{RuleEngine, RuleError};
use crate::obligations::store::{ObligationStore, Page, PageRequest, RotationRequest, StoreError};

/// Outcome of a committed renewal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenewalReceipt {
    pub record_id: RecordId,
    pub key: ObligationKey,
    pub effective_date: NaiveDate,
    pub previous: Option<RecordId>,
    pub evidence: Option<ArtifactRef>,
    pub archived_evidence: Option<ArtifactRef>,
    pub resolved_alerts: Vec<AlertId>,
}

/// Pre-submission view of whether a key can be renewed today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EligibilityView {
    pub exists: bool,
    /// The active record has not yet expired.
    pub valid: bool,
    pub can_renew: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligible_from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_remaining: Option<i64>,
}

/// Coordinates rule evaluation, evidence archival, record rotation, and
/// alert resolution for renewals.
pub struct RenewalService<S, D, A> {
    store: Arc<S>,
    archive: Arc<D>,
    alerts: Arc<A>,
    engine: RuleEngine,
    config: ComplianceConfig,
    confirmations: Option<DeliveryQueue>,
    in_flight: Mutex<HashSet<ObligationKey>>,
}

/// Exclusive claim on a key for the duration of one submission.
struct Lease<'a> {
    key: ObligationKey,
    in_flight: &'a Mutex<HashSet<ObligationKey>>,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl<S, D, A> RenewalService<S, D, A>
where
    S: ObligationStore + 'static,
    D: DocumentArchive + 'static,
    A: AlertStore + 'static,
{
    pub fn new(store: Arc<S>, archive: Arc<D>, alerts: Arc<A>, config: ComplianceConfig) -> Self {
        Self {
            store,
            archive,
            alerts,
            engine: RuleEngine::new(),
            config,
            confirmations: None,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_confirmations(mut self, queue: DeliveryQueue) -> Self {
        self.confirmations = Some(queue);
        self
    }

    pub fn config(&self) -> &ComplianceConfig {
        &self.config
    }

    /// Replace the active record of the submitted category.
    ///
    /// Evidence archival and the store rotation either both take effect or
    /// neither does; alert resolution and the confirmation notice happen
    /// after the commit and never undo it.
    pub fn submit_renewal(
        &self,
        request: RenewalRequest,
        today: NaiveDate,
    ) -> Result<RenewalReceipt, RenewalError> {
        let RenewalRequest {
            asset_id,
            acting_user,
            submission,
            evidence,
        } = request;
        let key = ObligationKey::new(asset_id, submission.category());
        let _lease = self.lease(&key)?;

        let current = self.store.get_active(&key)?;
        if let Some(active) = &current {
            self.ensure_eligible(active, &submission, today)?;
        }
        let resolved = submission.resolve(&self.engine)?;
        if let Some(upload) = &evidence {
            if extension_for(&upload.content_type).is_none() {
                return Err(ArchiveError::UnsupportedContentType(
                    upload.content_type.essence_str().to_string(),
                )
                .into());
            }
        }

        let archived = self.archive.archive_active(&key)?;
        let stored = match &evidence {
            Some(upload) => match self.archive.store_active(&key, upload) {
                Ok(artifact) => Some(artifact),
                Err(err) => {
                    self.compensate(&key, &archived, false, current.as_ref(), &err.to_string())?;
                    return Err(err.into());
                }
            },
            None => None,
        };

        let now = Utc::now();
        let rotation = RotationRequest {
            key: key.clone(),
            expected_active: current.as_ref().map(|active| active.id),
            record: NewObligationRecord {
                key: key.clone(),
                issued_date: resolved.issued_date,
                effective_date: resolved.effective_date,
                params: resolved.params,
                details: resolved.details,
                evidence: stored.clone(),
                recorded_by: acting_user.clone(),
                recorded_at: now,
            },
            archived_evidence: archived.archived().cloned(),
            acting_user: acting_user.clone(),
            rotated_at: now,
        };
        let record_id = match self.store.rotate(rotation) {
            Ok(id) => id,
            Err(err) => {
                self.compensate(
                    &key,
                    &archived,
                    stored.is_some(),
                    current.as_ref(),
                    &err.to_string(),
                )?;
                return Err(err.into());
            }
        };

        info!(
            asset = %key.asset_id,
            category = %key.category,
            record = %record_id,
            due = %resolved.effective_date,
            user = %acting_user,
            "obligation renewed"
        );

        let resolved_alerts = match self
            .alerts
            .resolve_pending(&key.asset_id, key.category, now)
        {
            Ok(ids) => ids,
            Err(err) => {
                warn!(asset = %key.asset_id, category = %key.category, error = %err, "renewal committed but pending alerts were not resolved");
                Vec::new()
            }
        };

        self.confirm(&key, record_id, resolved.effective_date, &acting_user);

        Ok(RenewalReceipt {
            record_id,
            key,
            effective_date: resolved.effective_date,
            previous: current.map(|active| active.id),
            evidence: stored,
            archived_evidence: archived.archived().cloned(),
            resolved_alerts,
        })
    }

    pub fn check_eligibility(
        &self,
        asset_id: &AssetId,
        category: ObligationCategory,
        today: NaiveDate,
    ) -> Result<EligibilityView, RenewalError> {
        let key = ObligationKey::new(asset_id.clone(), category);
        let Some(active) = self.store.get_active(&key)? else {
            return Ok(EligibilityView {
                exists: false,
                valid: false,
                can_renew: true,
                eligible_from: None,
                effective_date: None,
                days_remaining: None,
            });
        };

        let window = self.engine.renewal_window(&active, &self.config)?;
        Ok(EligibilityView {
            exists: true,
            valid: today <= active.effective_date,
            can_renew: window.is_open(today),
            eligible_from: window.opens_on,
            effective_date: Some(active.effective_date),
            days_remaining: Some(window.days_remaining(today)),
        })
    }

    pub fn active(
        &self,
        asset_id: &AssetId,
        category: ObligationCategory,
    ) -> Result<Option<ObligationRecord>, RenewalError> {
        let key = ObligationKey::new(asset_id.clone(), category);
        Ok(self.store.get_active(&key)?)
    }

    pub fn history(
        &self,
        asset_id: &AssetId,
        category: ObligationCategory,
        page: PageRequest,
    ) -> Result<Page<HistoryEntry>, RenewalError> {
        let key = ObligationKey::new(asset_id.clone(), category);
        Ok(self.store.list_history(&key, page)?)
    }

    fn lease(&self, key: &ObligationKey) -> Result<Lease<'_>, RenewalError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(key.clone()) {
            return Err(RenewalError::ConcurrentRotation { key: key.clone() });
        }
        Ok(Lease {
            key: key.clone(),
            in_flight: &self.in_flight,
        })
    }

    fn ensure_eligible(
        &self,
        active: &ObligationRecord,
        submission: &RenewalSubmission,
        today: NaiveDate,
    ) -> Result<(), RenewalError> {
        if let (
            RuleParams::RegistrationTax { period: settled },
            RenewalSubmission::RegistrationTax { period, .. },
        ) = (&active.params, submission)
        {
            if period <= settled {
                return Err(RuleError::invalid(
                    active.category(),
                    format!("period {period} is already settled (latest {settled})"),
                )
                .into());
            }
        }

        let window = self.engine.renewal_window(active, &self.config)?;
        match window.opens_on {
            Some(eligible_from) if !window.is_open(today) => {
                Err(RenewalError::RenewalNotYetEligible {
                    key: active.key.clone(),
                    eligible_from,
                    expires_on: window.expires_on,
                })
            }
            _ => Ok(()),
        }
    }

    /// Undoes the archive moves of a rotation that did not commit. When the
    /// undo itself fails, the still-active record no longer matches its
    /// evidence and the caller gets `EvidenceInconsistent` instead of the
    /// original failure.
    fn compensate(
        &self,
        key: &ObligationKey,
        archived: &ArchiveOutcome,
        stored_new: bool,
        active: Option<&ObligationRecord>,
        cause: &str,
    ) -> Result<(), RenewalError> {
        let mut problems = Vec::new();
        if stored_new {
            if let Err(err) = self.archive.discard_active(key) {
                problems.push(format!("discard uncommitted evidence: {err}"));
            }
        }
        if let ArchiveOutcome::Archived(artifact) = archived {
            if let Err(err) = self.archive.restore_archived(key, artifact) {
                problems.push(format!("restore {}: {err}", artifact.location));
            }
        }
        if problems.is_empty() {
            return Ok(());
        }

        let active_record = active.map(|record| record.id);
        let reason = format!("{cause}; compensation failed: {}", problems.join("; "));
        error!(
            key = %key,
            record = ?active_record,
            archived = ?archived.archived().map(|artifact| artifact.location.as_str()),
            reason = %reason,
            "active record left without its evidence"
        );
        Err(RenewalError::EvidenceInconsistent {
            key: key.clone(),
            active_record,
            reason,
        })
    }

    fn confirm(
        &self,
        key: &ObligationKey,
        record_id: RecordId,
        effective_date: NaiveDate,
        acting_user: &str,
    ) {
        let Some(queue) = &self.confirmations else {
            return;
        };
        let notice = Notice::new(
            TEMPLATE_RENEWAL_CONFIRMED,
            AudienceKey::Admin,
            key.asset_id.clone(),
            key.category,
        )
        .detail("record", record_id)
        .detail("effective_date", effective_date)
        .detail("submitted_by", acting_user);
        if let Err(err) = queue.enqueue(notice) {
            warn!(key = %key, error = %err, "renewal confirmation not queued");
        }
    }
}

/// Error raised by the renewal service.
#[derive(Debug, thiserror::Error)]
pub enum RenewalError {
    #[error(transparent)]
    InvalidParameters(#[from] RuleError),
    #[error("{key} cannot be renewed before {eligible_from} (current record expires {expires_on})")]
    RenewalNotYetEligible {
        key: ObligationKey,
        eligible_from: NaiveDate,
        expires_on: NaiveDate,
    },
    #[error("a renewal for {key} is already in progress")]
    ConcurrentRotation { key: ObligationKey },
    #[error(transparent)]
    ArchiveFailed(#[from] ArchiveError),
    #[error(transparent)]
    Store(StoreError),
    #[error("evidence for {key} (active record {active_record:?}) needs manual repair: {reason}")]
    EvidenceInconsistent {
        key: ObligationKey,
        active_record: Option<RecordId>,
        reason: String,
    },
}

impl From<StoreError> for RenewalError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConcurrentRotation { key } => Self::ConcurrentRotation { key },
            other => Self::Store(other),
        }
    }
}
