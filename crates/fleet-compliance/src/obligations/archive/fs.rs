use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    content_type_for_extension, extension_for, ArchiveError, ArchiveOutcome, ArtifactRef,
    DocumentArchive, EvidenceUpload,
};
use crate::obligations::domain::ObligationKey;

const ACTIVE_AREA: &str = "active";
const HISTORY_AREA: &str = "history";

/// Filesystem archive laid out as `<root>/<area>/<category>/<asset>/<uuid>.<ext>`.
///
/// Moves between areas use `fs::rename`, so both areas must live on the same
/// filesystem.
#[derive(Debug, Clone)]
pub struct FsDocumentArchive {
    root: PathBuf,
}

impl FsDocumentArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a stored artifact.
    pub fn resolve(&self, artifact: &ArtifactRef) -> PathBuf {
        artifact
            .location
            .split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn relative_dir(area: &str, key: &ObligationKey) -> String {
        format!(
            "{area}/{}/{}",
            key.category.slug(),
            encode_segment(&key.asset_id.0)
        )
    }

    fn area_dir(&self, area: &str, key: &ObligationKey) -> PathBuf {
        self.root
            .join(area)
            .join(key.category.slug())
            .join(encode_segment(&key.asset_id.0))
    }

    fn artifact_ref(area: &str, key: &ObligationKey, file: &str) -> ArtifactRef {
        let content_type = Path::new(file)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(content_type_for_extension)
            .unwrap_or("application/octet-stream");
        ArtifactRef {
            location: format!("{}/{file}", Self::relative_dir(area, key)),
            content_type: content_type.to_string(),
            file_name: None,
        }
    }

    fn active_files(&self, key: &ObligationKey) -> Result<Vec<String>, ArchiveError> {
        let dir = self.area_dir(ACTIVE_AREA, key);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(failed(key, format!("read {}", dir.display()), &err)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| failed(key, "read active entry", &err))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                files.push(name);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl DocumentArchive for FsDocumentArchive {
    fn store_active(
        &self,
        key: &ObligationKey,
        upload: &EvidenceUpload,
    ) -> Result<ArtifactRef, ArchiveError> {
        let extension = extension_for(&upload.content_type).ok_or_else(|| {
            ArchiveError::UnsupportedContentType(upload.content_type.essence_str().to_string())
        })?;
        if !self.active_files(key)?.is_empty() {
            return Err(ArchiveError::ActiveExists { key: key.clone() });
        }

        let dir = self.area_dir(ACTIVE_AREA, key);
        fs::create_dir_all(&dir)
            .map_err(|err| failed(key, format!("create {}", dir.display()), &err))?;

        let id = Uuid::new_v4();
        let file = format!("{id}.{extension}");
        let staging = dir.join(format!(".{id}.partial"));
        let target = dir.join(&file);
        fs::write(&staging, &upload.bytes)
            .map_err(|err| failed(key, format!("write {}", staging.display()), &err))?;
        if let Err(err) = fs::rename(&staging, &target) {
            let _ = fs::remove_file(&staging);
            return Err(failed(key, format!("publish {}", target.display()), &err));
        }

        debug!(key = %key, file = %file, "stored active evidence");
        let mut artifact = Self::artifact_ref(ACTIVE_AREA, key, &file);
        artifact.content_type = upload.content_type.essence_str().to_string();
        artifact.file_name = upload.file_name.clone();
        Ok(artifact)
    }

    fn archive_active(&self, key: &ObligationKey) -> Result<ArchiveOutcome, ArchiveError> {
        let files = self.active_files(key)?;
        let Some(first) = files.first().cloned() else {
            return Ok(ArchiveOutcome::NoneExisted);
        };

        let source_dir = self.area_dir(ACTIVE_AREA, key);
        let history_dir = self.area_dir(HISTORY_AREA, key);
        fs::create_dir_all(&history_dir)
            .map_err(|err| failed(key, format!("create {}", history_dir.display()), &err))?;

        let mut moved: Vec<&String> = Vec::new();
        for file in &files {
            if let Err(err) = fs::rename(source_dir.join(file), history_dir.join(file)) {
                for done in moved {
                    if let Err(restore) = fs::rename(history_dir.join(done), source_dir.join(done)) {
                        warn!(key = %key, file = %done, error = %restore, "failed to restore evidence after partial archive");
                    }
                }
                return Err(failed(key, format!("move {file} to history"), &err));
            }
            moved.push(file);
        }

        debug!(key = %key, files = files.len(), "archived active evidence");
        Ok(ArchiveOutcome::Archived(Self::artifact_ref(
            HISTORY_AREA,
            key,
            &first,
        )))
    }

    fn discard_active(&self, key: &ObligationKey) -> Result<(), ArchiveError> {
        let dir = self.area_dir(ACTIVE_AREA, key);
        for file in self.active_files(key)? {
            let path = dir.join(&file);
            fs::remove_file(&path)
                .map_err(|err| failed(key, format!("remove {}", path.display()), &err))?;
        }
        Ok(())
    }

    fn restore_archived(
        &self,
        key: &ObligationKey,
        artifact: &ArtifactRef,
    ) -> Result<ArtifactRef, ArchiveError> {
        let prefix = format!("{}/", Self::relative_dir(HISTORY_AREA, key));
        let file = artifact
            .location
            .strip_prefix(&prefix)
            .filter(|file| !file.is_empty() && !file.contains('/'))
            .ok_or_else(|| ArchiveError::ArchiveFailed {
                key: key.clone(),
                reason: format!("{} is not a history artifact of this key", artifact.location),
            })?;
        if !self.active_files(key)?.is_empty() {
            return Err(ArchiveError::ActiveExists { key: key.clone() });
        }

        let active_dir = self.area_dir(ACTIVE_AREA, key);
        fs::create_dir_all(&active_dir)
            .map_err(|err| failed(key, format!("create {}", active_dir.display()), &err))?;
        fs::rename(
            self.area_dir(HISTORY_AREA, key).join(file),
            active_dir.join(file),
        )
        .map_err(|err| failed(key, format!("restore {file}"), &err))?;

        debug!(key = %key, file = %file, "restored archived evidence");
        let mut restored = Self::artifact_ref(ACTIVE_AREA, key, file);
        restored.content_type = artifact.content_type.clone();
        restored.file_name = artifact.file_name.clone();
        Ok(restored)
    }
}

fn failed(key: &ObligationKey, context: impl Into<String>, err: &io::Error) -> ArchiveError {
    ArchiveError::ArchiveFailed {
        key: key.clone(),
        reason: format!("{}: {err}", context.into()),
    }
}

/// Asset ids come from outside. Percent-encodes every byte other than
/// lowercase ASCII letters, digits, `-` and `_`, so distinct ids always map
/// to distinct single segments, including on case-insensitive filesystems.
fn encode_segment(value: &str) -> String {
    if value.is_empty() {
        return "%".to_string();
    }
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' => encoded.push(char::from(byte)),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}
