use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use super::{ActiveCursor, Page, PageRequest, RotationRequest, StoreError};
use crate::obligations::domain::{
    AssetId, HistoryEntry, ObligationKey, ObligationRecord, RecordId,
};

/// Mutex-guarded store used by the service binary and tests.
#[derive(Debug, Default)]
pub struct MemoryObligationStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_record: u64,
    next_sequence: u64,
    active: BTreeMap<ObligationKey, ObligationRecord>,
    history: BTreeMap<ObligationKey, Vec<HistoryEntry>>,
}

impl MemoryObligationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("obligation store lock poisoned".to_string()))
    }
}

impl super::ObligationStore for MemoryObligationStore {
    fn get_active(&self, key: &ObligationKey) -> Result<Option<ObligationRecord>, StoreError> {
        Ok(self.lock()?.active.get(key).cloned())
    }

    fn rotate(&self, request: RotationRequest) -> Result<RecordId, StoreError> {
        let RotationRequest {
            key,
            expected_active,
            mut record,
            archived_evidence,
            acting_user,
            rotated_at,
        } = request;

        let mut inner = self.lock()?;
        let current = inner.active.get(&key).map(|active| active.id);
        if current != expected_active {
            return Err(StoreError::ConcurrentRotation { key });
        }

        inner.next_record += 1;
        let id = RecordId(inner.next_record);
        record.key = key.clone();

        if let Some(mut previous) = inner.active.remove(&key) {
            previous.is_active = false;
            inner.next_sequence += 1;
            let entry = HistoryEntry {
                sequence: inner.next_sequence,
                record: previous,
                archived_evidence,
                rotated_at,
                rotated_by: acting_user,
            };
            inner.history.entry(key.clone()).or_default().push(entry);
        }

        debug!(key = %key, record = %id, "installed active obligation record");
        inner.active.insert(key, record.into_active(id));
        Ok(id)
    }

    fn list_history(
        &self,
        key: &ObligationKey,
        page: PageRequest,
    ) -> Result<Page<HistoryEntry>, StoreError> {
        let inner = self.lock()?;
        let newest_first: Vec<HistoryEntry> = inner
            .history
            .get(key)
            .map(|entries| entries.iter().rev().cloned().collect())
            .unwrap_or_default();
        Ok(Page::from_ordered(newest_first, page))
    }

    fn list_active(
        &self,
        cursor: &ActiveCursor,
    ) -> Result<Page<ObligationRecord, ActiveCursor>, StoreError> {
        let inner = self.lock()?;
        let lower = match &cursor.after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        let mut remaining = inner.active.range((lower, Bound::Unbounded));
        let items: Vec<ObligationRecord> = remaining
            .by_ref()
            .take(cursor.limit)
            .map(|(_, record)| record.clone())
            .collect();

        let next = match items.last() {
            Some(last) if cursor.limit > 0 && remaining.next().is_some() => Some(ActiveCursor {
                after: Some(last.key.clone()),
                limit: cursor.limit,
            }),
            _ => None,
        };
        Ok(Page { items, next })
    }

    fn remove_asset(&self, asset_id: &AssetId) -> Result<usize, StoreError> {
        let mut inner = self.lock()?;
        let before = inner.active.len()
            + inner.history.values().map(Vec::len).sum::<usize>();
        inner.active.retain(|key, _| &key.asset_id != asset_id);
        inner.history.retain(|key, _| &key.asset_id != asset_id);
        let after = inner.active.len()
            + inner.history.values().map(Vec::len).sum::<usize>();

        let removed = before - after;
        if removed == 0 {
            return Err(StoreError::NotFound(asset_id.to_string()));
        }
        Ok(removed)
    }
}
