//! Per-job capabilities selected once when the job is built.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use relay_model::{Deployment, JobDescriptor};

use crate::{
    error::{CoreError, DownloadError, ExecError},
    log::JobLog,
};

/// Puts the project content into the working area.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, log: &JobLog, target: &Path) -> Result<(), DownloadError>;
}

/// Runs the job inside the working area and returns its exit status.
///
/// A failing run is a non-zero status. `Err` is reserved for infrastructure faults.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, log: &JobLog, target: &Path) -> Result<i32, ExecError>;
}

#[async_trait]
impl<T: Downloader + ?Sized> Downloader for std::sync::Arc<T> {
    async fn download(&self, log: &JobLog, target: &Path) -> Result<(), DownloadError> {
        (**self).download(log, target).await
    }
}

#[async_trait]
impl<T: Executor + ?Sized> Executor for std::sync::Arc<T> {
    async fn execute(&self, log: &JobLog, target: &Path) -> Result<i32, ExecError> {
        (**self).execute(log, target).await
    }
}

/// Downloader/executor pair built for one job.
pub struct Workload {
    pub downloader: Box<dyn Downloader>,
    pub executor: Box<dyn Executor>,
    /// Reports the executor leaves behind, uploaded after it exits.
    pub reports: Option<ReportSpec>,
}

impl Workload {
    pub fn new(downloader: Box<dyn Downloader>, executor: Box<dyn Executor>) -> Self {
        Self {
            downloader,
            executor,
            reports: None,
        }
    }

    pub fn with_reports(mut self, reports: ReportSpec) -> Self {
        self.reports = Some(reports);
        self
    }
}

/// Where an executor writes its JUnit reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSpec {
    /// Directory relative to the working area.
    pub dir: PathBuf,
    /// Glob below `dir`, e.g. `**/*.xml`.
    pub pattern: String,
    pub session_id: Option<String>,
}

/// Values a factory needs besides the job itself.
#[derive(Clone, Default)]
pub struct BuildContext {
    pub token: String,
    pub server_url: String,
    pub api_key: String,
    pub email: String,
    pub team_id: String,
    pub deployment: Option<Deployment>,
    pub x11_display: Option<String>,
    pub xvfb_run: Option<String>,
}

impl BuildContext {
    pub fn is_on_premise(&self) -> bool {
        self.deployment.is_some_and(|d| d.is_on_premise())
    }
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("server_url", &self.server_url)
            .field("email", &self.email)
            .field("team_id", &self.team_id)
            .field("deployment", &self.deployment)
            .field("x11_display", &self.x11_display)
            .field("xvfb_run", &self.xvfb_run)
            .finish_non_exhaustive()
    }
}

/// Builds the workload matching a job's source and kind.
pub trait WorkloadFactory: Send + Sync {
    fn build(&self, job: &JobDescriptor, ctx: &BuildContext) -> Result<Workload, CoreError>;
}
