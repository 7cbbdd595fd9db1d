//! Attachment store — persists spreadsheet attachments under one root directory.
//!
//! File names are `<YYYYMMDD_HHMMSS>_<original filename>`, derived from the
//! message's received time, so saving the same attachment twice overwrites
//! the earlier copy. Files are never deleted here.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;

use crate::error::StorageError;
use crate::mail::Attachment;

/// Timestamp layout used in stored file names.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// File-backed store for incoming attachments.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    /// Create a store rooted at `root`. Nothing is touched on disk yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage root if it does not exist. Idempotent.
    pub async fn ensure_directory(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: self.root.clone(),
                source,
            })
    }

    /// Path an attachment received at `received_at` is stored under.
    pub fn path_for(&self, filename: &str, received_at: DateTime<Utc>) -> PathBuf {
        self.root.join(file_name_for(filename, received_at))
    }

    /// Write `attachment` to disk, replacing any file already at its path.
    pub async fn save(
        &self,
        attachment: &Attachment,
        received_at: DateTime<Utc>,
    ) -> Result<PathBuf, StorageError> {
        let path = self.path_for(&attachment.filename, received_at);
        fs::write(&path, &attachment.content)
            .await
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

/// Stored file name for an attachment.
///
/// Only the final component of `filename` is kept, so a crafted name can't
/// escape the storage root.
pub fn file_name_for(filename: &str, received_at: DateTime<Utc>) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or("attachment");
    format!("{}_{}", received_at.format(TIMESTAMP_FORMAT), base)
}
