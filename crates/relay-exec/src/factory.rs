use std::path::PathBuf;

use relay_core::{
    AgentConfig, BuildContext, CoreError, Downloader, Executor, ReportSpec, Workload,
    WorkloadFactory,
};
use relay_model::{JobDescriptor, JobKind, ProjectSource};
use tracing::debug;

use crate::{
    download::{ArchiveDownloader, GitDownloader},
    install::RunnerInstalls,
    native::NativeRunnerExecutor,
    script::{GenericScriptExecutor, OUTPUT_DIR},
};

const JUNIT_PATTERN: &str = "**/*.xml";

/// Executor settings read once at startup.
#[derive(Debug, Clone, Default)]
pub struct ExecSettings {
    pub runner_executables: Vec<String>,
    pub runners_root: PathBuf,
    pub release_index_url: Option<String>,
}

impl ExecSettings {
    pub fn from_config(cfg: &AgentConfig) -> Self {
        Self {
            runner_executables: cfg.runner_executables.clone().unwrap_or_default(),
            runners_root: RunnerInstalls::default_root(),
            release_index_url: cfg.release_index_url.clone(),
        }
    }
}

/// Picks the downloader by project source and the executor by job kind.
pub struct ExecFactory {
    client: reqwest::Client,
    settings: ExecSettings,
}

impl ExecFactory {
    pub fn new(client: reqwest::Client, settings: ExecSettings) -> Self {
        Self { client, settings }
    }

    fn downloader(&self, job: &JobDescriptor, ctx: &BuildContext) -> Box<dyn Downloader> {
        match &job.source {
            ProjectSource::Archive { url } => {
                let bearer = ctx.is_on_premise().then(|| ctx.token.clone());
                Box::new(ArchiveDownloader::project(self.client.clone(), url, bearer))
            }
            ProjectSource::Git(repo) => Box::new(GitDownloader::new(repo.clone())),
        }
    }

    fn executor(
        &self,
        job: &JobDescriptor,
        ctx: &BuildContext,
    ) -> Result<Box<dyn Executor>, CoreError> {
        match &job.kind {
            JobKind::NativeRunner(params) => Ok(Box::new(NativeRunnerExecutor::new(
                params.clone(),
                job.project_id.clone(),
                job.team_id.clone(),
                ctx.clone(),
                self.settings.runner_executables.clone(),
                RunnerInstalls::new(
                    self.client.clone(),
                    self.settings.runners_root.clone(),
                    self.settings.release_index_url.clone(),
                ),
            ))),
            JobKind::GenericScript(params) if params.script.trim().is_empty() => {
                Err(CoreError::EmptyJob)
            }
            JobKind::GenericScript(params) => {
                Ok(Box::new(GenericScriptExecutor::new(params.clone())))
            }
        }
    }
}

impl WorkloadFactory for ExecFactory {
    fn build(&self, job: &JobDescriptor, ctx: &BuildContext) -> Result<Workload, CoreError> {
        debug!(job_id = %job.id, kind = job.kind.label(), "building workload");
        let workload = Workload::new(self.downloader(job, ctx), self.executor(job, ctx)?);
        Ok(match &job.kind {
            JobKind::GenericScript(params) => workload.with_reports(ReportSpec {
                dir: PathBuf::from(OUTPUT_DIR),
                pattern: JUNIT_PATTERN.to_string(),
                session_id: params.session_id.clone(),
            }),
            JobKind::NativeRunner(_) => workload,
        })
    }
}
