//! Orchestration engine of the relay agent.
//!
//! The scheduler polls the control server under an admission ceiling, and every acquired job
//! runs through its own [`pipeline::JobPipeline`] that streams the job log and reports status.
//! Concrete transports and executors plug in through the traits in [`control`] and [`runner`].

pub mod error;
pub use error::{ControlError, CoreError, DownloadError, ExecError, PipelineError, UploadError};

pub mod admission;
pub use admission::{AdmissionGate, AdmissionPermit};

pub mod credential;
pub use credential::{AuthState, Credential, CredentialManager, Login};

pub mod control;
pub use control::{BlobStore, ControlPlane, ControlSession};

pub mod config;
pub use config::{AgentConfig, ConfigStore};

pub mod log;
pub use log::{JobLog, LogStreamer, LogUploader, ReportUploader};

pub mod runner;
pub use runner::{BuildContext, Downloader, Executor, ReportSpec, Workload, WorkloadFactory};

pub mod pipeline;
pub use pipeline::{JobPipeline, PipelineSettings};

pub mod scheduler;
pub use scheduler::{AgentContext, Scheduler, SchedulerConfig, TickOutcome};

pub mod system;
pub mod timefmt;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
