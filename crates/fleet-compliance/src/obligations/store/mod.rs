//! Persistence contract for active and historical obligation records.

mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::archive::ArtifactRef;
use super::domain::{AssetId, HistoryEntry, NewObligationRecord, ObligationKey, ObligationRecord, RecordId};

pub use memory::MemoryObligationStore;

/// Offset pagination used by every listing on the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    pub const fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }
}

/// Keyset cursor over active records: resumes strictly after the last key
/// seen, so rotations between pages neither skip nor repeat a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCursor {
    pub after: Option<ObligationKey>,
    pub limit: usize,
}

impl ActiveCursor {
    pub const fn first(limit: usize) -> Self {
        Self { after: None, limit }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T, C = PageRequest> {
    pub items: Vec<T>,
    /// Request for the following page, absent once the listing is exhausted.
    pub next: Option<C>,
}

impl<T> Page<T> {
    /// Slices an already ordered listing.
    pub fn from_ordered(items: Vec<T>, request: PageRequest) -> Self {
        let total = items.len();
        let end = request.offset.saturating_add(request.limit).min(total);
        let items: Vec<T> = items
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();
        let next = (request.limit > 0 && end < total).then_some(PageRequest {
            offset: end,
            limit: request.limit,
        });
        Self { items, next }
    }
}

/// Everything needed to supersede the active record of one key.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationRequest {
    pub key: ObligationKey,
    /// Active record the caller read before rotating; `None` for a first record.
    pub expected_active: Option<RecordId>,
    pub record: NewObligationRecord,
    /// History location of the prior record's evidence, if it was archived.
    pub archived_evidence: Option<ArtifactRef>,
    pub acting_user: String,
    pub rotated_at: DateTime<Utc>,
}

/// Storage abstraction for obligation records.
///
/// `rotate` is the only write path for a key: it must move the prior active
/// record into history and install the new one as a single atomic step.
pub trait ObligationStore: Send + Sync {
    fn get_active(&self, key: &ObligationKey) -> Result<Option<ObligationRecord>, StoreError>;
    fn rotate(&self, request: RotationRequest) -> Result<RecordId, StoreError>;
    /// Newest first.
    fn list_history(
        &self,
        key: &ObligationKey,
        page: PageRequest,
    ) -> Result<Page<HistoryEntry>, StoreError>;
    /// Ordered by obligation key.
    fn list_active(
        &self,
        cursor: &ActiveCursor,
    ) -> Result<Page<ObligationRecord, ActiveCursor>, StoreError>;
    /// Administrative cascade: drops active and historical records of an asset.
    fn remove_asset(&self, asset_id: &AssetId) -> Result<usize, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("rotation already in progress or superseded for {key}")]
    ConcurrentRotation { key: ObligationKey },
    #[error("no records stored for {0}")]
    NotFound(String),
    #[error("obligation store unavailable: {0}")]
    Unavailable(String),
}
