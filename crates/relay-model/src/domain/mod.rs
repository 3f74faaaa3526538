mod job_id;
pub use job_id::JobId;

mod job_status;
pub use job_status::JobStatus;

mod agent_load;
pub use agent_load::AgentLoad;

mod deployment;
pub use deployment::Deployment;

mod log_upload;
pub use log_upload::{LogUploadState, UploadDestination};

/// Identifier of the project a job belongs to, as issued by the control server.
pub type ProjectId = String;

/// Identifier of the team the agent is registered with.
pub type TeamId = String;
