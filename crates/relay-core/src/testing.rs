//! Scripted fakes for the agent seams.
//!
//! Enabled for this crate's tests and, through the `test-support` feature, for downstream crates.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use relay_model::{
    AgentInfo, BuildInfo, JobId, JobParameter, JobRecord, JobStatus, PingReply, ReportRecord,
    SaveLogRecord, StatusUpdate, TestProject, TokenGrant, UploadDestination,
};
use tokio::sync::{Notify, watch};

use crate::{
    control::{BlobStore, ControlPlane},
    error::{ControlError, CoreError, DownloadError, ExecError},
    log::JobLog,
    runner::{BuildContext, Downloader, Executor, Workload, WorkloadFactory},
};
use relay_model::JobDescriptor;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// A call observed by [`FakeControlPlane`], recorded before the scripted outcome applies.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    BuildInfo,
    IssueToken { email: String },
    RefreshToken(String),
    RequestJob { uuid: String, team_id: String },
    UpdateJob { token: String, update: StatusUpdate },
    UploadDestination { project_id: String },
    SaveJobLog(SaveLogRecord),
    SaveReport(ReportRecord),
    NotifyJob(JobId),
    PingAgent(AgentInfo),
}

#[derive(Default)]
struct Script {
    calls: Vec<Call>,
    grant_ttl: Option<u64>,
    login_reject: Option<String>,
    refresh_reject: Option<String>,
    omit_refresh: bool,
    network_down: bool,
    issued: u64,
    expire_next: usize,
    profiles: Vec<String>,
    jobs: VecDeque<JobRecord>,
    threshold: Option<usize>,
    fail_update: Option<JobStatus>,
    destinations: u64,
}

impl Script {
    fn bearer(&mut self) -> Result<(), ControlError> {
        if self.network_down {
            return Err(ControlError::Network("connection refused".into()));
        }
        if self.expire_next > 0 {
            self.expire_next -= 1;
            return Err(ControlError::TokenExpired);
        }
        Ok(())
    }

    fn grant(&mut self) -> Result<TokenGrant, ControlError> {
        let Some(ttl) = self.grant_ttl else {
            return Err(ControlError::InvalidResponse("no grant scripted".into()));
        };
        self.issued += 1;
        Ok(TokenGrant {
            access_token: Some(format!("access-{}", self.issued)),
            refresh_token: (!self.omit_refresh).then(|| format!("refresh-{}", self.issued)),
            expires_in: Some(ttl),
            error_description: None,
        })
    }
}

/// In-memory control server.
#[derive(Default)]
pub struct FakeControlPlane {
    script: Mutex<Script>,
}

impl FakeControlPlane {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.script).calls.clone()
    }

    /// Every status update received, in order.
    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UpdateJob { update, .. } => Some(update),
                _ => None,
            })
            .collect()
    }

    /// Token requests succeed with the given lifetime; clears a login rejection.
    pub fn grant_tokens(&self, expires_in: u64) {
        let mut s = lock(&self.script);
        s.grant_ttl = Some(expires_in);
        s.login_reject = None;
    }

    pub fn omit_refresh_tokens(&self) {
        lock(&self.script).omit_refresh = true;
    }

    pub fn reject_logins(&self, description: &str) {
        lock(&self.script).login_reject = Some(description.to_string());
    }

    pub fn reject_refreshes(&self, description: &str) {
        lock(&self.script).refresh_reject = Some(description.to_string());
    }

    pub fn fail_network(&self, down: bool) {
        lock(&self.script).network_down = down;
    }

    /// The next `n` bearer calls are refused as expired.
    pub fn expire_next(&self, n: usize) {
        lock(&self.script).expire_next = n;
    }

    pub fn set_profiles(&self, profiles: &[&str]) {
        lock(&self.script).profiles = profiles.iter().map(|p| p.to_string()).collect();
    }

    pub fn queue_job(&self, record: JobRecord) {
        lock(&self.script).jobs.push_back(record);
    }

    pub fn set_threshold(&self, threshold: Option<usize>) {
        lock(&self.script).threshold = threshold;
    }

    /// The next update carrying `status` fails with a 500.
    pub fn fail_update_for(&self, status: JobStatus) {
        lock(&self.script).fail_update = Some(status);
    }

    /// A native-runner job fetching its project as an archive.
    pub fn archive_job(id: &str) -> JobRecord {
        JobRecord {
            id: Some(JobId::from(id)),
            parameter: Some(JobParameter {
                source_type: Some("DOWNLOAD".into()),
                command: Some("-retry=0".into()),
                download_url: Some(format!("https://srv.example/api/v1/files/{id}")),
                ..JobParameter::default()
            }),
            test_project: Some(TestProject {
                project_id: Some("9".into()),
            }),
        }
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn build_info(&self) -> Result<BuildInfo, ControlError> {
        let mut s = lock(&self.script);
        s.calls.push(Call::BuildInfo);
        if s.network_down {
            return Err(ControlError::Network("connection refused".into()));
        }
        let mut info = BuildInfo::default();
        info.profiles.active = s.profiles.clone();
        Ok(info)
    }

    async fn issue_token(&self, email: &str, _password: &str) -> Result<TokenGrant, ControlError> {
        let mut s = lock(&self.script);
        s.calls.push(Call::IssueToken {
            email: email.to_string(),
        });
        if s.network_down {
            return Err(ControlError::Network("connection refused".into()));
        }
        if let Some(desc) = &s.login_reject {
            return Err(ControlError::Auth(desc.clone()));
        }
        s.grant()
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, ControlError> {
        let mut s = lock(&self.script);
        s.calls.push(Call::RefreshToken(refresh_token.to_string()));
        if s.network_down {
            return Err(ControlError::Network("connection refused".into()));
        }
        if let Some(desc) = s.refresh_reject.take() {
            return Err(ControlError::Auth(desc));
        }
        s.grant()
    }

    async fn request_job(
        &self,
        _token: &str,
        uuid: &str,
        team_id: &str,
    ) -> Result<JobRecord, ControlError> {
        let mut s = lock(&self.script);
        s.calls.push(Call::RequestJob {
            uuid: uuid.to_string(),
            team_id: team_id.to_string(),
        });
        s.bearer()?;
        Ok(s.jobs.pop_front().unwrap_or_default())
    }

    async fn update_job(&self, token: &str, update: &StatusUpdate) -> Result<(), ControlError> {
        let mut s = lock(&self.script);
        s.calls.push(Call::UpdateJob {
            token: token.to_string(),
            update: update.clone(),
        });
        s.bearer()?;
        if s.fail_update == Some(update.status) {
            s.fail_update = None;
            return Err(ControlError::Status {
                status: 500,
                body: "scripted failure".into(),
            });
        }
        Ok(())
    }

    async fn upload_destination(
        &self,
        _token: &str,
        project_id: &str,
    ) -> Result<UploadDestination, ControlError> {
        let mut s = lock(&self.script);
        s.calls.push(Call::UploadDestination {
            project_id: project_id.to_string(),
        });
        s.bearer()?;
        s.destinations += 1;
        let n = s.destinations;
        Ok(UploadDestination {
            upload_url: format!("https://blob.example/{n}?sig=x"),
            path: format!("logs/{project_id}/{n}"),
        })
    }

    async fn save_job_log(&self, _token: &str, record: &SaveLogRecord) -> Result<(), ControlError> {
        let mut s = lock(&self.script);
        s.calls.push(Call::SaveJobLog(record.clone()));
        s.bearer()
    }

    async fn save_report(&self, _token: &str, record: &ReportRecord) -> Result<(), ControlError> {
        let mut s = lock(&self.script);
        s.calls.push(Call::SaveReport(record.clone()));
        s.bearer()
    }

    async fn notify_job(
        &self,
        _token: &str,
        job_id: &JobId,
        _project_id: &str,
    ) -> Result<(), ControlError> {
        let mut s = lock(&self.script);
        s.calls.push(Call::NotifyJob(job_id.clone()));
        s.bearer()
    }

    async fn ping_agent(&self, _token: &str, info: &AgentInfo) -> Result<PingReply, ControlError> {
        let mut s = lock(&self.script);
        s.calls.push(Call::PingAgent(info.clone()));
        s.bearer()?;
        Ok(PingReply {
            threshold: s.threshold,
        })
    }
}

/// In-memory blob store. `(attempts, successful puts)` is published on a watch channel.
pub struct FakeBlobStore {
    bodies: Mutex<Vec<(UploadDestination, Vec<u8>)>>,
    fail: AtomicBool,
    progress: watch::Sender<(usize, usize)>,
}

impl FakeBlobStore {
    pub fn new() -> Arc<Self> {
        let (progress, _) = watch::channel((0, 0));
        Arc::new(Self {
            bodies: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            progress,
        })
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn put_count(&self) -> usize {
        self.progress.borrow().1
    }

    pub fn attempt_count(&self) -> usize {
        self.progress.borrow().0
    }

    pub fn last_body(&self) -> Option<Vec<u8>> {
        lock(&self.bodies).last().map(|(_, b)| b.clone())
    }

    pub fn destinations(&self) -> Vec<UploadDestination> {
        lock(&self.bodies).iter().map(|(d, _)| d.clone()).collect()
    }

    pub async fn wait_puts(&self, n: usize) {
        let mut rx = self.progress.subscribe();
        let _ = rx.wait_for(|(_, puts)| *puts >= n).await;
    }

    pub async fn wait_attempts(&self, n: usize) {
        let mut rx = self.progress.subscribe();
        let _ = rx.wait_for(|(attempts, _)| *attempts >= n).await;
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn put(
        &self,
        destination: &UploadDestination,
        body: Vec<u8>,
    ) -> Result<(), ControlError> {
        if self.fail.load(Ordering::SeqCst) {
            self.progress.send_modify(|(a, _)| *a += 1);
            return Err(ControlError::Status {
                status: 403,
                body: "signature expired".into(),
            });
        }
        lock(&self.bodies).push((destination.clone(), body));
        self.progress.send_modify(|(a, p)| {
            *a += 1;
            *p += 1;
        });
        Ok(())
    }
}

/// Downloader that drops a marker file into the target, or fails.
pub struct FakeDownloader {
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl FakeDownloader {
    pub const MARKER: &'static str = "project.marker";

    pub fn ok() -> Self {
        Self {
            fail: false,
            calls: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Arc::default(),
        }
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(&self, log: &JobLog, target: &Path) -> Result<(), DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            log.error("download failed").await;
            return Err(DownloadError::Fetch("scripted failure".into()));
        }
        tokio::fs::write(target.join(Self::MARKER), b"ok").await?;
        Ok(())
    }
}

/// Executor returning a scripted exit status, optionally held until released.
pub struct FakeExecutor {
    outcome: Option<i32>,
    calls: AtomicUsize,
    last_target: Mutex<Option<PathBuf>>,
    lines: Mutex<Vec<String>>,
    files: Mutex<Vec<(String, String)>>,
    hold: Mutex<Option<Arc<Notify>>>,
}

impl FakeExecutor {
    fn with_outcome(outcome: Option<i32>) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            calls: AtomicUsize::new(0),
            last_target: Mutex::new(None),
            lines: Mutex::new(Vec::new()),
            files: Mutex::new(Vec::new()),
            hold: Mutex::new(None),
        })
    }

    pub fn exiting(code: i32) -> Arc<Self> {
        Self::with_outcome(Some(code))
    }

    /// Fails with an infrastructure error instead of returning a status.
    pub fn faulting() -> Arc<Self> {
        Self::with_outcome(None)
    }

    pub fn with_lines(self: Arc<Self>, lines: &[&str]) -> Arc<Self> {
        *lock(&self.lines) = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Writes `contents` to `rel` under the target while executing.
    pub fn writing(self: Arc<Self>, rel: &str, contents: &str) -> Arc<Self> {
        lock(&self.files).push((rel.to_string(), contents.to_string()));
        self
    }

    /// Makes `execute` wait until the returned notify fires.
    pub fn hold(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *lock(&self.hold) = Some(Arc::clone(&notify));
        notify
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_target(&self) -> Option<PathBuf> {
        lock(&self.last_target).clone()
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn execute(&self, log: &JobLog, target: &Path) -> Result<i32, ExecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_target) = Some(target.to_path_buf());

        let lines = lock(&self.lines).clone();
        for line in lines {
            log.info(line).await;
        }
        let files = lock(&self.files).clone();
        for (rel, contents) in files {
            let path = target.join(rel);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, contents).await?;
        }
        let hold = lock(&self.hold).clone();
        if let Some(hold) = hold {
            hold.notified().await;
        }

        self.outcome
            .ok_or_else(|| ExecError::Spawn("scripted fault".into()))
    }
}

/// Factory pairing [`FakeDownloader::ok`] with a shared [`FakeExecutor`].
pub struct FakeFactory {
    executor: Arc<FakeExecutor>,
    reject: bool,
}

impl FakeFactory {
    pub fn new(executor: Arc<FakeExecutor>) -> Self {
        Self {
            executor,
            reject: false,
        }
    }

    /// Every build fails with [`CoreError::EmptyJob`].
    pub fn rejecting(executor: Arc<FakeExecutor>) -> Self {
        Self {
            executor,
            reject: true,
        }
    }
}

impl WorkloadFactory for FakeFactory {
    fn build(&self, _job: &JobDescriptor, _ctx: &BuildContext) -> Result<Workload, CoreError> {
        if self.reject {
            return Err(CoreError::EmptyJob);
        }
        Ok(Workload::new(
            Box::new(FakeDownloader::ok()),
            Box::new(Arc::clone(&self.executor)),
        ))
    }
}
