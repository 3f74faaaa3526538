use std::sync::Arc;

use relay_model::{JobId, LogUploadState, SaveLogRecord, UploadDestination};
use tracing::{debug, info};

use crate::{
    control::{BlobStore, ControlSession},
    error::UploadError,
    log::JobLog,
    timefmt,
};

/// Registered log upload: fetch a destination, PUT the file, record it with the server.
///
/// Keeps the [`LogUploadState`] chain so each registration names the previous upload path.
pub struct LogUploader {
    session: ControlSession,
    blob: Arc<dyn BlobStore>,
    job_id: JobId,
    project_id: String,
    state: Option<LogUploadState>,
}

impl LogUploader {
    pub fn new(
        session: ControlSession,
        blob: Arc<dyn BlobStore>,
        job_id: JobId,
        project_id: String,
    ) -> Self {
        Self {
            session,
            blob,
            job_id,
            project_id,
            state: None,
        }
    }

    pub fn state(&self) -> Option<&LogUploadState> {
        self.state.as_ref()
    }

    /// Uploads the complete current log content and returns the destination used.
    pub async fn upload(&mut self, log: &JobLog) -> Result<UploadDestination, UploadError> {
        info!(job_id = %self.job_id, "uploading job log");
        let project_id = self.project_id.as_str();

        let destination = self
            .session
            .call(|c, t| async move { c.upload_destination(&t, project_id).await })
            .await?;

        let state = match self.state.take() {
            Some(prev) => prev.advance(destination),
            None => LogUploadState::new(destination),
        };
        let state = self.state.insert(state);

        let body = log.snapshot().await?;
        self.blob.put(&state.destination, body).await?;

        let file_name = log
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let record = SaveLogRecord::new(
            project_id,
            &self.job_id,
            timefmt::stamped_id(),
            &file_name,
            state,
        );
        let record = &record;
        self.session
            .call(|c, t| async move { c.save_job_log(&t, record).await })
            .await?;

        debug!(job_id = %self.job_id, path = %state.destination.path, "job log registered");
        Ok(state.destination.clone())
    }
}
