use thiserror::Error;

use relay_model::ModelError;

/// Outcome of a failed control-server or blob-store call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// Credentials rejected, or a 400-class reply carrying an error description.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// The bearer token was refused as expired; renew and replay.
    #[error("access token expired")]
    TokenExpired,
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ControlError {
    /// Transient failures; retried on the next tick, never immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ControlError::Network(_) | ControlError::Status { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ControlError::Auth(_))
    }
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("extract failed: {0}")]
    Extract(String),
    #[error("clone failed: {0}")]
    Clone(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        DownloadError::Io(e.to_string())
    }
}

/// Infrastructure faults raised while executing a job.
///
/// A test run that fails is not an error; it is a non-zero exit status.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("runner not found: {0}")]
    RunnerNotFound(String),
    #[error("runner install failed: {0}")]
    Install(String),
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("killed by signal")]
    KilledBySignal,
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error("read failed: {0}")]
    Io(String),
    #[error("invalid file pattern: {0}")]
    Pattern(String),
}

impl From<std::io::Error> for UploadError {
    fn from(e: std::io::Error) -> Self {
        UploadError::Io(e.to_string())
    }
}

/// Failure of one pipeline step; converted into a FAILED report at the pipeline boundary.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("provision failed: {0}")]
    Provision(String),
    #[error("job rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("config error: {0}")]
    Config(String),
    #[error("no workload for job kind '{0}'")]
    NoWorkload(String),
    #[error("no admission capacity")]
    NoCapacity,
    #[error("server deployment profile is unknown")]
    UnknownDeployment,
    #[error("job record carries no job")]
    EmptyJob,
}
