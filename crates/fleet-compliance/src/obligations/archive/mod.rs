//! Evidence artifacts attached to obligation records.
//!
//! Each key owns at most one active artifact. Superseding a record moves the
//! artifact into the key's history area; it is never copied.

mod fs;

use mime::Mime;
use serde::{Deserialize, Serialize};

use super::domain::ObligationKey;

pub use fs::FsDocumentArchive;

/// Opaque pointer to a stored artifact, relative to the archive root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub location: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// Uploaded evidence as received from the submitter.
#[derive(Debug, Clone)]
pub struct EvidenceUpload {
    pub bytes: Vec<u8>,
    pub content_type: Mime,
    pub file_name: Option<String>,
}

impl EvidenceUpload {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: Mime) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
            file_name: None,
        }
    }

    pub fn named(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Archived(ArtifactRef),
    NoneExisted,
}

impl ArchiveOutcome {
    pub fn archived(&self) -> Option<&ArtifactRef> {
        match self {
            Self::Archived(artifact) => Some(artifact),
            Self::NoneExisted => None,
        }
    }
}

/// Storage for active and historical evidence.
///
/// `discard_active` and `restore_archived` exist only so a caller can undo
/// an uncommitted rotation.
pub trait DocumentArchive: Send + Sync {
    fn store_active(
        &self,
        key: &ObligationKey,
        upload: &EvidenceUpload,
    ) -> Result<ArtifactRef, ArchiveError>;
    fn archive_active(&self, key: &ObligationKey) -> Result<ArchiveOutcome, ArchiveError>;
    fn discard_active(&self, key: &ObligationKey) -> Result<(), ArchiveError>;
    fn restore_archived(
        &self,
        key: &ObligationKey,
        artifact: &ArtifactRef,
    ) -> Result<ArtifactRef, ArchiveError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("an active artifact already exists for {key}")]
    ActiveExists { key: ObligationKey },
    #[error("unsupported evidence content type {0}")]
    UnsupportedContentType(String),
    #[error("archive operation failed for {key}: {reason}")]
    ArchiveFailed { key: ObligationKey, reason: String },
}

/// File extension for accepted evidence types: PDF and common image formats.
pub fn extension_for(content_type: &Mime) -> Option<&'static str> {
    match (content_type.type_().as_str(), content_type.subtype().as_str()) {
        ("application", "pdf") => Some("pdf"),
        ("image", "jpeg") => Some("jpg"),
        ("image", "png") => Some("png"),
        ("image", "webp") => Some("webp"),
        _ => None,
    }
}

pub(crate) fn content_type_for_extension(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => Some("application/pdf"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
