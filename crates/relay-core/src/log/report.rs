use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use relay_model::ReportRecord;
use tracing::{debug, info};

use crate::{
    control::{BlobStore, ControlSession},
    error::UploadError,
    timefmt,
};

/// Uploads every report file under a directory as one batch.
///
/// Each file goes through the upload chain: fetch a destination, PUT, register. The first
/// file (in name order) is registered last with `is_end`, closing the batch.
pub struct ReportUploader {
    session: ControlSession,
    blob: Arc<dyn BlobStore>,
    project_id: String,
    session_id: Option<String>,
}

impl ReportUploader {
    pub fn new(
        session: ControlSession,
        blob: Arc<dyn BlobStore>,
        project_id: String,
        session_id: Option<String>,
    ) -> Self {
        Self {
            session,
            blob,
            project_id,
            session_id,
        }
    }

    /// Returns the number of files uploaded. No matching file is not an error.
    pub async fn upload_dir(&self, root: &Path, pattern: &str) -> Result<usize, UploadError> {
        let files = matching_files(root, pattern)?;
        let Some((first, rest)) = files.split_first() else {
            debug!(root = %root.display(), "no reports to upload");
            return Ok(0);
        };

        let batch = timefmt::stamped_id();
        info!(batch = %batch, files = files.len(), "uploading reports");
        for file in rest {
            self.upload_file(root, file, &batch, false).await?;
        }
        self.upload_file(root, first, &batch, true).await?;
        Ok(files.len())
    }

    async fn upload_file(
        &self,
        root: &Path,
        file: &Path,
        batch: &str,
        is_end: bool,
    ) -> Result<(), UploadError> {
        let project_id = self.project_id.as_str();
        let destination = self
            .session
            .call(|c, t| async move { c.upload_destination(&t, project_id).await })
            .await?;

        let body = tokio::fs::read(file).await?;
        self.blob.put(&destination, body).await?;

        let record = ReportRecord {
            project_id: self.project_id.clone(),
            batch: batch.to_string(),
            folder_path: folder_of(root, file),
            file_name: file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            uploaded_path: destination.path.clone(),
            is_end,
            session_id: self.session_id.clone(),
        };
        let record = &record;
        self.session
            .call(|c, t| async move { c.save_report(&t, record).await })
            .await?;
        debug!(file = %file.display(), path = %destination.path, "report registered");
        Ok(())
    }
}

fn matching_files(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, UploadError> {
    let escaped = glob::Pattern::escape(&root.to_string_lossy());
    let full = format!("{escaped}/{pattern}");
    let paths = glob::glob(&full).map_err(|e| UploadError::Pattern(e.to_string()))?;

    let mut files = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| UploadError::Io(e.to_string()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parent directory relative to `root`; `.` for files directly in it.
fn folder_of(root: &Path, file: &Path) -> String {
    let rel = file
        .parent()
        .and_then(|p| p.strip_prefix(root).ok())
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    if rel.is_empty() { ".".to_string() } else { rel }
}
