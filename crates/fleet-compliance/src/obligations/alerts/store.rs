use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{AlertDraft, AlertFilter, AlertId, AlertInsert, AlertRecord, AlertState, AudienceKey};
use crate::obligations::domain::{AssetId, ObligationCategory};

/// Alert persistence with idempotent pending inserts.
///
/// At most one Pending alert may exist per (asset, category, audience);
/// `create_if_absent` must check and insert atomically.
pub trait AlertStore: Send + Sync {
    fn create_if_absent(&self, draft: AlertDraft) -> Result<AlertInsert, AlertStoreError>;
    /// Completes every pending alert of the pair and returns their ids.
    fn resolve_pending(
        &self,
        asset_id: &AssetId,
        category: ObligationCategory,
        at: DateTime<Utc>,
    ) -> Result<Vec<AlertId>, AlertStoreError>;
    fn resolve(&self, id: AlertId, at: DateTime<Utc>) -> Result<AlertRecord, AlertStoreError>;
    /// Newest first.
    fn list(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>, AlertStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlertStoreError {
    #[error("alert {0} not found")]
    NotFound(AlertId),
    #[error("alert {0} is already completed")]
    AlreadyCompleted(AlertId),
    #[error("alert store unavailable: {0}")]
    Unavailable(String),
}

type PendingKey = (AssetId, ObligationCategory, AudienceKey);

#[derive(Debug, Default)]
pub struct MemoryAlertStore {
    inner: Mutex<AlertTables>,
}

#[derive(Debug, Default)]
struct AlertTables {
    next_id: u64,
    alerts: BTreeMap<AlertId, AlertRecord>,
    pending: HashMap<PendingKey, AlertId>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, AlertTables>, AlertStoreError> {
        self.inner
            .lock()
            .map_err(|_| AlertStoreError::Unavailable("alert store lock poisoned".to_string()))
    }
}

impl AlertStore for MemoryAlertStore {
    fn create_if_absent(&self, draft: AlertDraft) -> Result<AlertInsert, AlertStoreError> {
        let mut tables = self.lock()?;
        let key = (
            draft.asset_id.clone(),
            draft.category,
            draft.audience.clone(),
        );
        if let Some(existing) = tables.pending.get(&key) {
            return Ok(AlertInsert::AlreadyPending(*existing));
        }

        tables.next_id += 1;
        let record = AlertRecord {
            id: AlertId(tables.next_id),
            asset_id: draft.asset_id,
            category: draft.category,
            audience: draft.audience,
            state: AlertState::Pending,
            due_date: draft.due_date,
            message: draft.message,
            created_at: draft.created_at,
            resolved_at: None,
        };
        tables.pending.insert(key, record.id);
        tables.alerts.insert(record.id, record.clone());
        Ok(AlertInsert::Created(record))
    }

    fn resolve_pending(
        &self,
        asset_id: &AssetId,
        category: ObligationCategory,
        at: DateTime<Utc>,
    ) -> Result<Vec<AlertId>, AlertStoreError> {
        let mut tables = self.lock()?;
        let mut resolved: Vec<AlertId> = tables
            .pending
            .iter()
            .filter(|((asset, cat, _), _)| asset == asset_id && *cat == category)
            .map(|(_, id)| *id)
            .collect();
        resolved.sort();

        tables
            .pending
            .retain(|(asset, cat, _), _| !(asset == asset_id && *cat == category));
        for id in &resolved {
            if let Some(alert) = tables.alerts.get_mut(id) {
                alert.state = AlertState::Completed;
                alert.resolved_at = Some(at);
            }
        }
        Ok(resolved)
    }

    fn resolve(&self, id: AlertId, at: DateTime<Utc>) -> Result<AlertRecord, AlertStoreError> {
        let mut tables = self.lock()?;
        let alert = tables
            .alerts
            .get_mut(&id)
            .ok_or(AlertStoreError::NotFound(id))?;
        if alert.state == AlertState::Completed {
            return Err(AlertStoreError::AlreadyCompleted(id));
        }
        alert.state = AlertState::Completed;
        alert.resolved_at = Some(at);
        let resolved = alert.clone();

        let key = (
            resolved.asset_id.clone(),
            resolved.category,
            resolved.audience.clone(),
        );
        tables.pending.remove(&key);
        Ok(resolved)
    }

    fn list(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>, AlertStoreError> {
        let tables = self.lock()?;
        let mut alerts: Vec<AlertRecord> = tables
            .alerts
            .values()
            .filter(|alert| filter.matches(alert))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(alerts)
    }
}
