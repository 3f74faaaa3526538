//! Seams towards the control server and the blob store.

mod session;
pub use session::ControlSession;

use async_trait::async_trait;
use relay_model::{
    AgentInfo, BuildInfo, JobId, JobRecord, PingReply, ReportRecord, SaveLogRecord, StatusUpdate,
    TokenGrant, UploadDestination,
};

use crate::error::ControlError;

/// Endpoints of the control server used by the agent.
///
/// Every bearer-authenticated call takes the access token explicitly; token handling
/// lives in [`ControlSession`](crate::ControlSession), not in implementations.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Server build info, including the active deployment profiles.
    async fn build_info(&self) -> Result<BuildInfo, ControlError>;

    async fn issue_token(&self, email: &str, password: &str) -> Result<TokenGrant, ControlError>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, ControlError>;

    /// Asks for the next job. An empty record means no job is queued.
    async fn request_job(
        &self,
        token: &str,
        uuid: &str,
        team_id: &str,
    ) -> Result<JobRecord, ControlError>;

    async fn update_job(&self, token: &str, update: &StatusUpdate) -> Result<(), ControlError>;

    /// Fresh pre-signed destination for a log upload.
    async fn upload_destination(
        &self,
        token: &str,
        project_id: &str,
    ) -> Result<UploadDestination, ControlError>;

    async fn save_job_log(&self, token: &str, record: &SaveLogRecord) -> Result<(), ControlError>;

    /// Registers an uploaded JUnit report file.
    async fn save_report(&self, token: &str, record: &ReportRecord) -> Result<(), ControlError>;

    async fn notify_job(
        &self,
        token: &str,
        job_id: &JobId,
        project_id: &str,
    ) -> Result<(), ControlError>;

    async fn ping_agent(&self, token: &str, info: &AgentInfo) -> Result<PingReply, ControlError>;
}

/// PUT of raw bytes to a pre-signed destination.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, destination: &UploadDestination, body: Vec<u8>)
    -> Result<(), ControlError>;
}
