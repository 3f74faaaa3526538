use serde::{Deserialize, Serialize};

use crate::domain::{JobId, LogUploadState};

/// Query record for `save-log`, registering an uploaded log file against a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveLogRecord {
    pub project_id: String,
    pub job_id: JobId,
    /// `<unix-millis>-<uuid-v4>`.
    pub batch: String,
    pub file_name: String,
    pub uploaded_path: String,
    pub old_uploaded_path: Option<String>,
}

impl SaveLogRecord {
    pub fn new(
        project_id: &str,
        job_id: &JobId,
        batch: String,
        file_name: &str,
        state: &LogUploadState,
    ) -> Self {
        Self {
            project_id: project_id.to_string(),
            job_id: job_id.clone(),
            batch,
            file_name: file_name.to_string(),
            uploaded_path: state.destination.path.clone(),
            old_uploaded_path: state.prior_upload_path.clone(),
        }
    }
}
