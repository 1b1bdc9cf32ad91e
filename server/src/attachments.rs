//! Attachment storage on the local filesystem.
//!
//! Images arriving alongside an event are written to a flat directory with
//! a timestamped filename. Saving is best-effort from the pipeline's point
//! of view: a failed write is logged by the caller and the event still
//! persists, just without a picture reference.

use std::path::{Path, PathBuf};

use axum::body::Bytes;
use chrono::Utc;
use thiserror::Error;
use tracing::debug;

/// Filename timestamp layout, millisecond precision to keep names unique
/// across rapid swipes.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S%3f";

/// Attachment write failure. Never fails the surrounding request.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("attachment write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes event attachments under a single configured directory.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    dir: PathBuf,
}

impl AttachmentStore {
    /// Creates the store, creating the target directory if needed.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created.
    pub async fn init(dir: impl Into<PathBuf>) -> Result<Self, AttachmentError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Directory attachments are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Saves one attachment, returning the assigned filename.
    ///
    /// # Errors
    ///
    /// Surfaces the underlying I/O error; callers decide whether that
    /// degrades or fails the request.
    pub async fn save(&self, label: &str, content: &Bytes) -> Result<String, AttachmentError> {
        let filename = format!("{}_{label}.jpg", Utc::now().format(TIMESTAMP_FORMAT));
        let path = self.dir.join(&filename);
        tokio::fs::write(&path, content).await?;
        debug!(path = %path.display(), bytes = content.len(), "Attachment saved");
        Ok(filename)
    }
}
