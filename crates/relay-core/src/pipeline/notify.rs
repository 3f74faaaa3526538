use async_trait::async_trait;
use relay_model::JobId;
use tracing::{trace, warn};

use crate::{control::ControlSession, log::UploadObserver};

/// Tells the control server that new log content exists. Failures are logged and dropped.
pub(crate) async fn notify_job(session: &ControlSession, job_id: &JobId, project_id: &str) {
    let result = session
        .call(|c, t| async move { c.notify_job(&t, job_id, project_id).await })
        .await;
    match result {
        Ok(()) => trace!(job_id = %job_id, "job notified"),
        Err(e) => warn!(job_id = %job_id, error = %e, "unable to send job notification"),
    }
}

pub(crate) struct NotifyOnUpload {
    pub session: ControlSession,
    pub job_id: JobId,
    pub project_id: String,
}

#[async_trait]
impl UploadObserver for NotifyOnUpload {
    async fn uploaded(&self) {
        notify_job(&self.session, &self.job_id, &self.project_id).await;
    }
}
