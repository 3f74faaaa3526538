use std::{path::Path, sync::Arc};

use anyhow::Context;
use relay_control::{ControlConfig, HttpControlPlane};
use relay_core::{
    AdmissionGate, AgentConfig, AgentContext, ConfigStore, CredentialManager, Scheduler,
    SchedulerConfig,
    scheduler::LevelHook,
    system::{self, HostInfo},
};
use relay_exec::{ExecFactory, ExecSettings};
use relay_model::JobRecord;
use relay_observe::{LevelHandle, LoggerConfig, LoggerFormat, logger_init};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{Cli, Command, ConfigArgs, StartArgs};

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let store = ConfigStore::new(&cli.config);
    let format: LoggerFormat = cli.log_format.parse()?;
    match cli.command {
        Command::Config(args) => update_config(&store, format, &args).await,
        Command::Start(args) => start(store, format, args).await,
    }
}

fn init_logging(format: LoggerFormat, level: Option<&str>) -> anyhow::Result<Arc<LevelHandle>> {
    let cfg = LoggerConfig {
        format,
        ..LoggerConfig::default()
    }
    .with_level(level);
    Ok(Arc::new(logger_init(&cfg)?))
}

async fn update_config(
    store: &ConfigStore,
    format: LoggerFormat,
    args: &ConfigArgs,
) -> anyhow::Result<()> {
    let cfg = store.load().await?.merged(&args.overrides());
    init_logging(format, cfg.log_level.as_deref())?;
    persist_config(store, cfg).await?;
    Ok(())
}

/// Saves `cfg`, generating the agent uuid when it has none.
pub(crate) async fn persist_config(
    store: &ConfigStore,
    mut cfg: AgentConfig,
) -> anyhow::Result<AgentConfig> {
    if cfg.ensure_uuid() {
        info!(uuid = cfg.uuid.as_deref().unwrap_or_default(), "agent uuid generated");
    }
    store.save(&cfg).await?;
    info!(file = %store.path().display(), "updated configs");
    Ok(cfg)
}

async fn start(store: ConfigStore, format: LoggerFormat, args: StartArgs) -> anyhow::Result<()> {
    // 1) Config + logger
    let overrides = args.values.overrides();
    let cfg = store
        .load()
        .await
        .context("loading agent config")?
        .merged(&overrides);
    let level = init_logging(format, cfg.log_level.as_deref())?;
    info!(version = system::agent_version(), ci = args.ci, "relay agent started");
    info!(file = %store.path().display(), "loading configs");
    cfg.validate(store.path());

    // 2) Scheduler
    let scheduler = build_scheduler(store, overrides, &cfg, level)?;

    // 3) Run
    if args.ci {
        run_ci(&scheduler, &args.job_file).await
    } else {
        run_polling(&scheduler).await;
        Ok(())
    }
}

fn level_hook(handle: Arc<LevelHandle>) -> LevelHook {
    Arc::new(move |level: &str| match handle.set_level(level) {
        Ok(true) => info!(level = %handle.current(), "log level changed"),
        Ok(false) => {}
        Err(e) => warn!(level, error = %e, "log level not applied"),
    })
}

fn build_scheduler(
    store: ConfigStore,
    overrides: AgentConfig,
    cfg: &AgentConfig,
    level: Arc<LevelHandle>,
) -> anyhow::Result<Scheduler> {
    let control_cfg = ControlConfig::new(cfg.server_url.clone().unwrap_or_default())
        .with_proxy(cfg.proxy.clone());
    let http = Arc::new(HttpControlPlane::new(control_cfg).context("building control client")?);

    let mut downloads = reqwest::Client::builder();
    if let Some(proxy) = cfg.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
        downloads = downloads.proxy(reqwest::Proxy::all(proxy).context("invalid proxy")?);
    }
    let downloads = downloads.build().context("building download client")?;

    let work_root = std::env::current_dir()
        .context("resolving working directory")?
        .join("tmp");
    let config = SchedulerConfig::from_env(work_root);
    let credentials = Arc::new(CredentialManager::new(
        http.clone(),
        cfg.login(),
        config.renewal_margin,
    ));

    Ok(Scheduler::new(AgentContext {
        control: http.clone(),
        blob: http,
        credentials,
        gate: AdmissionGate::new(AdmissionGate::DEFAULT_CEILING),
        factory: Arc::new(ExecFactory::new(downloads, ExecSettings::from_config(cfg))),
        store,
        overrides,
        host: HostInfo::detect(),
        config,
        level_hook: Some(level_hook(level)),
    }))
}

async fn run_polling(scheduler: &Scheduler) {
    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received; shutting down");
                stop.cancel();
            }
            Err(e) => warn!(error = %e, "cannot listen for interrupts"),
        }
    });

    scheduler.run(cancel).await;
    info!(version = system::agent_version(), "agent stopped");
}

pub(crate) async fn read_job_file(path: &Path) -> anyhow::Result<JobRecord> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading job file {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parsing job file {}", path.display()))
}

async fn run_ci(scheduler: &Scheduler, job_file: &Path) -> anyhow::Result<()> {
    let record = read_job_file(job_file).await?;
    let status = scheduler.run_once(record).await?;
    info!(status = ?status, "job finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{
        Login,
        testing::{Call, FakeBlobStore, FakeControlPlane, FakeExecutor, FakeFactory},
    };
    use relay_model::JobStatus;
    use std::time::Duration;

    fn scheduler(fake: Arc<FakeControlPlane>, dir: &Path) -> Scheduler {
        let credentials = Arc::new(CredentialManager::new(
            fake.clone(),
            Login::default(),
            Duration::from_secs(10),
        ));
        Scheduler::new(AgentContext {
            control: fake,
            blob: FakeBlobStore::new(),
            credentials,
            gate: AdmissionGate::new(1),
            factory: Arc::new(FakeFactory::new(FakeExecutor::exiting(0))),
            store: ConfigStore::new(dir.join("agentconfig")),
            overrides: AgentConfig::default(),
            host: HostInfo {
                hostname: "ci-01".into(),
                ip: "10.0.0.5".into(),
                os: "Linux".into(),
            },
            config: SchedulerConfig::new(false, dir.join("tmp")),
            level_hook: None,
        })
    }

    #[tokio::test]
    async fn ci_mode_runs_the_job_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let job_file = dir.path().join("job.json");
        std::fs::write(
            &job_file,
            r#"{
                "id": 42,
                "parameter": {"type": "DOWNLOAD", "command": "-retry=0", "downloadUrl": "https://dl/p.zip"},
                "testProject": {"projectId": 9}
            }"#,
        )
        .unwrap();

        let fake = FakeControlPlane::new();
        fake.grant_tokens(3600);
        fake.set_profiles(&["prod"]);
        let sched = scheduler(fake.clone(), dir.path());

        run_ci(&sched, &job_file).await.unwrap();

        let statuses: Vec<JobStatus> = fake.updates().iter().map(|u| u.status).collect();
        assert_eq!(statuses, vec![JobStatus::Running, JobStatus::Success]);
        assert!(
            !fake
                .calls()
                .iter()
                .any(|c| matches!(c, Call::RequestJob { .. }))
        );
    }

    #[tokio::test]
    async fn missing_job_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_job_file(&dir.path().join("job.json")).await.unwrap_err();
        assert!(err.to_string().contains("reading job file"));
    }

    #[tokio::test]
    async fn config_command_persists_values_and_uuid() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("agentconfig"));
        std::fs::write(store.path(), "custom_key = \"kept\"\n").unwrap();

        let args = ConfigArgs {
            team_id: Some("7".into()),
            ..ConfigArgs::default()
        };
        let cfg = store.load().await.unwrap().merged(&args.overrides());
        let written = persist_config(&store, cfg).await.unwrap();
        assert!(written.uuid.is_some());

        let saved = store.load().await.unwrap();
        assert_eq!(saved.team_id.as_deref(), Some("7"));
        assert!(saved.uuid.is_some());
        assert!(saved.extra.contains_key("custom_key"));
    }
}
