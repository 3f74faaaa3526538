//! Acquisition and heartbeat drivers.

mod config;
pub use config::SchedulerConfig;

use std::sync::Arc;

use relay_model::{AgentInfo, Deployment, JobId, JobRecord, JobStatus, PingReply};
use tokio::{
    sync::OnceCell,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval, interval_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::{
    admission::{AdmissionGate, AdmissionPermit},
    config::{AgentConfig, ConfigStore},
    control::{BlobStore, ControlPlane, ControlSession},
    credential::{AuthPhase, CredentialManager},
    error::CoreError,
    pipeline::{JobPipeline, PipelineSettings},
    runner::{BuildContext, WorkloadFactory},
    system::{self, HostInfo},
};

/// Callback applying a log level read from the persisted config.
pub type LevelHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Everything a scheduler needs, constructed once and passed down.
pub struct AgentContext {
    pub control: Arc<dyn ControlPlane>,
    pub blob: Arc<dyn BlobStore>,
    pub credentials: Arc<CredentialManager>,
    pub gate: Arc<AdmissionGate>,
    pub factory: Arc<dyn WorkloadFactory>,
    pub store: ConfigStore,
    /// Command-line values, applied over the file on every reload.
    pub overrides: AgentConfig,
    pub host: HostInfo,
    pub config: SchedulerConfig,
    pub level_hook: Option<LevelHook>,
}

/// Result of one acquisition tick.
#[derive(Debug)]
pub enum TickOutcome {
    NoCapacity,
    UnknownDeployment,
    NoJob,
    Started {
        job_id: JobId,
        handle: JoinHandle<JobStatus>,
    },
}

pub struct Scheduler {
    ctx: AgentContext,
    session: ControlSession,
    deployment: OnceCell<Deployment>,
}

impl Scheduler {
    pub fn new(ctx: AgentContext) -> Self {
        let session = ControlSession::new(Arc::clone(&ctx.control), Arc::clone(&ctx.credentials));
        Self {
            ctx,
            session,
            deployment: OnceCell::new(),
        }
    }

    pub fn context(&self) -> &AgentContext {
        &self.ctx
    }

    /// Resolves the server deployment profile; cached after the first known answer.
    pub async fn deployment(&self) -> Result<Option<Deployment>, CoreError> {
        if let Some(d) = self.deployment.get() {
            return Ok(Some(*d));
        }
        let info = self.ctx.control.build_info().await?;
        match info.deployment() {
            Some(d) => {
                info!(deployment = ?d, "server deployment resolved");
                Ok(Some(*self.deployment.get_or_init(|| async { d }).await))
            }
            None => Ok(None),
        }
    }

    /// One acquisition attempt. A started pipeline runs detached from the tick.
    ///
    /// A handed-out job that cannot be built is still started, and fails with its reason.
    pub async fn acquire_tick(&self) -> Result<TickOutcome, CoreError> {
        let Some(permit) = self.ctx.gate.try_admit() else {
            return Ok(TickOutcome::NoCapacity);
        };

        let Some(deployment) = self.deployment().await? else {
            warn!("server advertises no deployment profile; skipping tick");
            return Ok(TickOutcome::UnknownDeployment);
        };
        let cfg = self.reload_config().await?;
        self.ctx.credentials.ensure_token().await?;

        let uuid = cfg.uuid.clone().unwrap_or_default();
        let team_id = cfg.team_id.clone().unwrap_or_default();
        let (uuid_ref, team_ref) = (uuid.as_str(), team_id.as_str());
        let record = self
            .session
            .call(|c, t| async move { c.request_job(&t, uuid_ref, team_ref).await })
            .await?;

        let Some(pipeline) = self.pipeline_for(record, deployment, &cfg).await? else {
            trace!("no job available");
            return Ok(TickOutcome::NoJob);
        };
        let job_id = pipeline.job_id().clone();
        let handle = tokio::spawn(pipeline.run(permit));
        Ok(TickOutcome::Started { job_id, handle })
    }

    /// Runs a single job from a local record to completion, without polling.
    pub async fn run_once(&self, record: JobRecord) -> Result<JobStatus, CoreError> {
        let permit: AdmissionPermit = self.ctx.gate.try_admit().ok_or(CoreError::NoCapacity)?;
        let deployment = self
            .deployment()
            .await?
            .ok_or(CoreError::UnknownDeployment)?;
        let cfg = self.reload_config().await?;
        self.ctx.credentials.ensure_token().await?;

        let pipeline = self
            .pipeline_for(record, deployment, &cfg)
            .await?
            .ok_or(CoreError::EmptyJob)?;
        Ok(pipeline.run(permit).await)
    }

    /// Reports host identity and load; applies a returned ceiling.
    ///
    /// Skipped until an agent uuid is persisted and a token has been obtained.
    pub async fn heartbeat_tick(&self) -> Result<Option<PingReply>, CoreError> {
        let cfg = self.ctx.store.load().await?.merged(&self.ctx.overrides);
        let Some(uuid) = cfg.uuid.clone().filter(|u| !u.is_empty()) else {
            debug!("no agent uuid yet; skipping heartbeat");
            return Ok(None);
        };
        if matches!(
            self.ctx.credentials.phase().await,
            AuthPhase::Unauthenticated | AuthPhase::Failed
        ) {
            debug!("not authenticated; skipping heartbeat");
            return Ok(None);
        }

        let host = &self.ctx.host;
        let info = AgentInfo {
            uuid,
            name: cfg.agent_name.clone().unwrap_or_else(|| host.hostname.clone()),
            team_id: cfg.team_id.clone().unwrap_or_default(),
            hostname: host.hostname.clone(),
            ip: host.ip.clone(),
            os: host.os.clone(),
            num_executing_jobs: self.ctx.gate.load().in_flight,
            agent_version: system::agent_version().to_string(),
        };
        trace!(?info, "sending heartbeat");

        let info = &info;
        let reply = self
            .session
            .call(|c, t| async move { c.ping_agent(&t, info).await })
            .await?;
        if let Some(threshold) = reply.threshold.filter(|t| *t > 0) {
            self.ctx.gate.set_ceiling(threshold);
        }
        Ok(Some(reply))
    }

    /// Drives both loops until `cancel` fires.
    ///
    /// Acquisition ticks immediately, heartbeats start one interval later. A failing tick is
    /// logged and the loop carries on.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            acquire = ?self.ctx.config.acquire_interval,
            heartbeat = ?self.ctx.config.heartbeat_interval,
            "scheduler started"
        );
        tokio::join!(
            self.acquire_loop(cancel.clone()),
            self.heartbeat_loop(cancel)
        );
        info!("scheduler stopped");
    }

    async fn acquire_loop(&self, cancel: CancellationToken) {
        let mut ticker = interval(self.ctx.config.acquire_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                r = self.acquire_tick() => r,
            };
            match outcome {
                Ok(TickOutcome::Started { job_id, .. }) => info!(job_id = %job_id, "job dispatched"),
                Ok(TickOutcome::NoCapacity) => trace!("at capacity"),
                Ok(_) => {}
                Err(e) => log_tick_error("acquisition", &e),
            }
        }
    }

    async fn heartbeat_loop(&self, cancel: CancellationToken) {
        let period = self.ctx.config.heartbeat_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                r = self.heartbeat_tick() => r,
            };
            if let Err(e) = outcome {
                log_tick_error("heartbeat", &e);
            }
        }
    }

    /// Re-reads the persisted config, persisting a freshly generated uuid when missing.
    ///
    /// Runs before any token request so an edited login applies on the same tick.
    async fn reload_config(&self) -> Result<AgentConfig, CoreError> {
        let mut file = self.ctx.store.load().await?;
        if file.ensure_uuid() {
            self.ctx.store.save(&file).await?;
            info!(uuid = file.uuid.as_deref().unwrap_or_default(), "agent uuid generated");
        }
        let cfg = file.merged(&self.ctx.overrides);

        if let (Some(hook), Some(level)) = (&self.ctx.level_hook, cfg.log_level.as_deref()) {
            hook(level);
        }
        self.ctx.credentials.update_login(cfg.login()).await;
        Ok(cfg)
    }

    /// `None` when the record carries no work.
    ///
    /// A record with an id that fails to convert, or that the factory rejects, yields a
    /// rejected pipeline so the server sees the job claimed and failed. Without an id there
    /// is nothing to report against and the error is returned.
    async fn pipeline_for(
        &self,
        record: JobRecord,
        deployment: Deployment,
        cfg: &AgentConfig,
    ) -> Result<Option<JobPipeline>, CoreError> {
        let team_id = cfg.team_id.clone().unwrap_or_default();
        let job_id = record.id.clone();
        let project_id = record
            .test_project
            .as_ref()
            .and_then(|p| p.project_id.clone())
            .unwrap_or_default();

        let job = match record.into_descriptor(&team_id) {
            Ok(Some(job)) => job,
            Ok(None) => return Ok(None),
            Err(e) => {
                let Some(job_id) = job_id else {
                    return Err(e.into());
                };
                error!(job_id = %job_id, error = %e, "invalid job record");
                return Ok(Some(self.rejected(
                    job_id,
                    project_id,
                    e.to_string(),
                    deployment,
                    cfg,
                )));
            }
        };

        let build = BuildContext {
            token: self.ctx.credentials.ensure_token().await?,
            server_url: cfg.server_url.clone().unwrap_or_default(),
            api_key: cfg.api_key.clone().unwrap_or_default(),
            email: cfg.email.clone().unwrap_or_default(),
            team_id: job.team_id.clone(),
            deployment: Some(deployment),
            x11_display: cfg.x11_display.clone(),
            xvfb_run: cfg.xvfb_run.clone(),
        };
        let pipeline = match self.ctx.factory.build(&job, &build) {
            Ok(workload) => JobPipeline::new(
                self.session.clone(),
                Arc::clone(&self.ctx.blob),
                self.settings(deployment, cfg),
                job,
                workload,
            ),
            Err(e) => {
                error!(job_id = %job.id, error = %e, "cannot build job");
                self.rejected(job.id, job.project_id, e.to_string(), deployment, cfg)
            }
        };
        Ok(Some(pipeline))
    }

    fn rejected(
        &self,
        job_id: JobId,
        project_id: String,
        reason: String,
        deployment: Deployment,
        cfg: &AgentConfig,
    ) -> JobPipeline {
        JobPipeline::rejected(
            self.session.clone(),
            Arc::clone(&self.ctx.blob),
            self.settings(deployment, cfg),
            job_id,
            project_id,
            reason,
        )
    }

    fn settings(&self, deployment: Deployment, cfg: &AgentConfig) -> PipelineSettings {
        PipelineSettings {
            work_root: self.ctx.config.work_root.clone(),
            keep_files: cfg.keep_files(),
            throttle_window: self.ctx.config.throttle_window,
            agent_version: system::agent_version().to_string(),
            server_url: cfg.server_url.clone().unwrap_or_default(),
            deployment: Some(deployment),
            email: cfg.email.clone().unwrap_or_default(),
        }
    }
}

fn log_tick_error(tick: &str, e: &CoreError) {
    match e {
        CoreError::Control(c) if c.is_retryable() => {
            warn!(tick, error = %e, "tick failed; retrying next interval");
        }
        _ => error!(tick, error = %e, "tick failed"),
    }
}
