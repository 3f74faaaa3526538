//! Per-job state machine: claim, provision, download, execute, report, teardown.

mod area;
pub use area::WorkingArea;

mod notify;

mod status;
use status::StatusReporter;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use relay_model::{Deployment, JobDescriptor, JobId, JobStatus};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    admission::AdmissionPermit,
    control::{BlobStore, ControlSession},
    error::PipelineError,
    log::{JobLog, LogStreamer, LogUploader, ReportUploader},
    runner::{ReportSpec, Workload},
};
use notify::{NotifyOnUpload, notify_job};

/// Name of the job log inside the working area.
pub const JOB_LOG_FILE: &str = "debug.log";

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Parent directory of every working area.
    pub work_root: PathBuf,
    pub keep_files: bool,
    pub throttle_window: Duration,
    pub agent_version: String,
    pub server_url: String,
    pub deployment: Option<Deployment>,
    pub email: String,
}

/// What the pipeline does once the job log is live.
enum Plan {
    Run(Workload),
    /// The job was handed out but cannot run; it is claimed and failed with this reason.
    Reject(String),
}

/// Resources acquired while provisioning, released at teardown.
#[derive(Default)]
struct Provisioned {
    area: Option<WorkingArea>,
    log: Option<JobLog>,
    streamer: Option<LogStreamer>,
}

/// Drives one job from claim to teardown.
///
/// Exactly one `RUNNING` report and one terminal report are sent once the job is claimed,
/// whatever step fails. Errors never escape [`run`](Self::run).
pub struct JobPipeline {
    session: ControlSession,
    blob: Arc<dyn BlobStore>,
    settings: PipelineSettings,
    job_id: JobId,
    project_id: String,
    label: &'static str,
    plan: Plan,
}

impl JobPipeline {
    pub fn new(
        session: ControlSession,
        blob: Arc<dyn BlobStore>,
        settings: PipelineSettings,
        job: JobDescriptor,
        workload: Workload,
    ) -> Self {
        Self {
            session,
            blob,
            settings,
            label: job.kind.label(),
            job_id: job.id,
            project_id: job.project_id,
            plan: Plan::Run(workload),
        }
    }

    /// Pipeline for a job that cannot be built; it reports `RUNNING` then `FAILED`.
    pub fn rejected(
        session: ControlSession,
        blob: Arc<dyn BlobStore>,
        settings: PipelineSettings,
        job_id: JobId,
        project_id: String,
        reason: String,
    ) -> Self {
        Self {
            session,
            blob,
            settings,
            job_id,
            project_id,
            label: "rejected",
            plan: Plan::Reject(reason),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Runs the job to completion and returns the terminal status that was reported.
    ///
    /// The admission permit is released at the start of teardown.
    #[instrument(level = "info", skip_all, fields(job_id = %self.job_id, project_id = %self.project_id))]
    pub async fn run(self, permit: AdmissionPermit) -> JobStatus {
        info!(kind = self.label, "job started");

        let mut reporter = StatusReporter::new(self.session.clone(), self.job_id.clone());
        if let Err(e) = reporter.advance(JobStatus::Running).await {
            warn!(error = %e, "cannot claim job, continuing anyway");
        }

        let mut uploader = LogUploader::new(
            self.session.clone(),
            Arc::clone(&self.blob),
            self.job_id.clone(),
            self.project_id.clone(),
        );
        let mut res = Provisioned::default();

        let status = match self.work(&mut uploader, &mut res).await {
            Ok(code) => {
                debug!(code, "executor finished");
                JobStatus::from_exit_code(code)
            }
            Err(e) => {
                error!(error = %e, "job failed");
                if let Some(log) = &res.log {
                    log.error(format!("Job failed: {e}")).await;
                }
                JobStatus::Failed
            }
        };

        match reporter.advance(status).await {
            Ok(()) => info!(status = ?status, "job completed"),
            Err(e) => error!(status = ?status, error = %e, "cannot report terminal status"),
        }

        self.teardown(permit, uploader, res).await;
        status
    }

    async fn work(
        &self,
        uploader: &mut LogUploader,
        res: &mut Provisioned,
    ) -> Result<i32, PipelineError> {
        let area = WorkingArea::create(&self.settings.work_root)
            .await
            .map_err(|e| PipelineError::Provision(format!("working area: {e}")))?;
        info!(path = %area.path().display(), "working area created");
        let target = area.path().to_path_buf();
        res.area = Some(area);

        let log = JobLog::create(target.join(JOB_LOG_FILE), self.job_id.clone())
            .await
            .map_err(|e| PipelineError::Provision(format!("job log: {e}")))?;
        res.log = Some(log.clone());

        let destination = uploader.upload(&log).await?;
        let observer = Arc::new(NotifyOnUpload {
            session: self.session.clone(),
            job_id: self.job_id.clone(),
            project_id: self.project_id.clone(),
        });
        res.streamer = Some(LogStreamer::attach(
            &log,
            destination,
            Arc::clone(&self.blob),
            self.settings.throttle_window,
            Some(observer),
        ));

        self.write_header(&log).await;

        let workload = match &self.plan {
            Plan::Run(workload) => workload,
            Plan::Reject(reason) => return Err(PipelineError::Rejected(reason.clone())),
        };

        info!("downloading project");
        workload.downloader.download(&log, &target).await?;

        info!("executing job");
        let code = workload.executor.execute(&log, &target).await?;
        log.info(format!("Job finished with exit code {code}.")).await;

        if let Some(spec) = &workload.reports {
            self.upload_reports(&log, &target, spec).await;
        }
        Ok(code)
    }

    /// Report upload failures are logged; they never change the job status.
    async fn upload_reports(&self, log: &JobLog, target: &Path, spec: &ReportSpec) {
        log.info("Uploading JUnit reports...").await;
        let reports = ReportUploader::new(
            self.session.clone(),
            Arc::clone(&self.blob),
            self.project_id.clone(),
            spec.session_id.clone(),
        );
        match reports.upload_dir(&target.join(&spec.dir), &spec.pattern).await {
            Ok(files) => {
                info!(files, "reports uploaded");
                log.info("All JUnit reports successfully uploaded.").await;
            }
            Err(e) => {
                warn!(error = %e, "report upload failed");
                log.error(format!("Report upload failed: {e}")).await;
            }
        }
    }

    async fn write_header(&self, log: &JobLog) {
        let s = &self.settings;
        let on_premise = if s.deployment.is_some_and(|d| d.is_on_premise()) {
            " (OnPremise)"
        } else {
            ""
        };
        log.info(format!("Triggered by relay agent {}.", s.agent_version))
            .await;
        log.info(format!("Agent server: {}{on_premise}", s.server_url))
            .await;
        log.info(format!("Agent user: {}", s.email)).await;
    }

    async fn teardown(&self, permit: AdmissionPermit, mut uploader: LogUploader, res: Provisioned) {
        drop(permit);

        if let Some(streamer) = res.streamer {
            streamer.stop().await;
        }

        if let Some(log) = &res.log {
            match uploader.upload(log).await {
                Ok(_) => info!("job log uploaded"),
                Err(e) => warn!(error = %e, "final job log upload failed"),
            }
        }

        notify_job(&self.session, &self.job_id, &self.project_id).await;

        if let Some(area) = res.area {
            if self.settings.keep_files {
                info!(path = %area.path().display(), "keeping working area");
            } else if let Err(e) = area.remove().await {
                warn!(error = %e, "cannot remove working area");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        admission::AdmissionGate,
        credential::{CredentialManager, Login},
        testing::{Call, FakeBlobStore, FakeControlPlane, FakeDownloader, FakeExecutor},
    };
    use relay_model::{JobKind, NativeRunnerParams, ProjectSource};

    struct Harness {
        fake: Arc<FakeControlPlane>,
        blob: Arc<FakeBlobStore>,
        gate: Arc<AdmissionGate>,
        root: tempfile::TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let fake = FakeControlPlane::new();
            fake.grant_tokens(3600);
            Self {
                fake,
                blob: FakeBlobStore::new(),
                gate: AdmissionGate::new(1),
                root: tempfile::tempdir().unwrap(),
            }
        }

        fn settings(&self, keep_files: bool) -> PipelineSettings {
            PipelineSettings {
                work_root: self.root.path().join("tmp"),
                keep_files,
                throttle_window: Duration::from_secs(10),
                agent_version: "0.0.1".into(),
                server_url: "https://srv.example".into(),
                deployment: Some(Deployment::OnPremise),
                email: "qa@example.com".into(),
            }
        }

        async fn run(
            &self,
            downloader: FakeDownloader,
            executor: Arc<FakeExecutor>,
            keep_files: bool,
        ) -> JobStatus {
            let workload = Workload::new(Box::new(downloader), Box::new(executor));
            self.run_workload(workload, keep_files).await
        }

        fn session(&self) -> ControlSession {
            let creds = Arc::new(CredentialManager::new(
                self.fake.clone(),
                Login::default(),
                Duration::from_secs(10),
            ));
            ControlSession::new(self.fake.clone(), creds)
        }

        async fn run_workload(&self, workload: Workload, keep_files: bool) -> JobStatus {
            let permit = self.gate.try_admit().unwrap();
            JobPipeline::new(
                self.session(),
                self.blob.clone(),
                self.settings(keep_files),
                job(),
                workload,
            )
            .run(permit)
            .await
        }

        fn statuses(&self) -> Vec<JobStatus> {
            self.fake.updates().into_iter().map(|u| u.status).collect()
        }

        fn notifications(&self) -> usize {
            self.fake
                .calls()
                .iter()
                .filter(|c| matches!(c, Call::NotifyJob(_)))
                .count()
        }
    }

    fn job() -> JobDescriptor {
        JobDescriptor {
            id: JobId::from("42"),
            project_id: "9".into(),
            team_id: "7".into(),
            kind: JobKind::NativeRunner(NativeRunnerParams::default()),
            source: ProjectSource::Archive {
                url: "https://srv.example/dl".into(),
            },
        }
    }

    #[tokio::test]
    async fn exit_zero_reports_success_and_removes_area() {
        let h = Harness::new();
        let exec = FakeExecutor::exiting(0);

        let status = h.run(FakeDownloader::ok(), exec.clone(), false).await;

        assert_eq!(status, JobStatus::Success);
        assert_eq!(h.statuses(), vec![JobStatus::Running, JobStatus::Success]);
        let target = exec.last_target().unwrap();
        assert!(!target.exists());
        assert_eq!(h.gate.load().in_flight, 0);
        assert!(h.notifications() >= 1);
    }

    #[tokio::test]
    async fn exit_two_reports_failed_after_running() {
        let h = Harness::new();
        let status = h
            .run(FakeDownloader::ok(), FakeExecutor::exiting(2), false)
            .await;

        assert_eq!(status, JobStatus::Failed);
        assert_eq!(h.statuses(), vec![JobStatus::Running, JobStatus::Failed]);
    }

    #[tokio::test]
    async fn download_failure_skips_execute_and_still_tears_down() {
        let h = Harness::new();
        let exec = FakeExecutor::exiting(0);

        let status = h.run(FakeDownloader::failing(), exec.clone(), false).await;

        assert_eq!(status, JobStatus::Failed);
        assert_eq!(exec.calls(), 0);
        assert_eq!(h.statuses(), vec![JobStatus::Running, JobStatus::Failed]);
        assert_eq!(h.gate.load().in_flight, 0);
        assert!(h.notifications() >= 1);

        let areas: Vec<_> = std::fs::read_dir(h.root.path().join("tmp"))
            .unwrap()
            .collect();
        assert!(areas.is_empty());
    }

    #[tokio::test]
    async fn executor_fault_reports_failed() {
        let h = Harness::new();
        let status = h
            .run(FakeDownloader::ok(), FakeExecutor::faulting(), false)
            .await;
        assert_eq!(status, JobStatus::Failed);
        assert_eq!(h.statuses(), vec![JobStatus::Running, JobStatus::Failed]);
    }

    #[tokio::test]
    async fn claim_failure_does_not_stop_the_job() {
        let h = Harness::new();
        h.fake.fail_update_for(JobStatus::Running);

        let status = h
            .run(FakeDownloader::ok(), FakeExecutor::exiting(0), false)
            .await;

        assert_eq!(status, JobStatus::Success);
        assert_eq!(h.statuses(), vec![JobStatus::Running, JobStatus::Success]);
    }

    #[tokio::test]
    async fn initial_upload_failure_fails_job_before_download() {
        let h = Harness::new();
        h.blob.fail(true);
        let download = FakeDownloader::ok();
        let downloads = download.counter();
        let exec = FakeExecutor::exiting(0);

        let status = h.run(download, exec.clone(), false).await;

        assert_eq!(status, JobStatus::Failed);
        assert_eq!(downloads.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(exec.calls(), 0);
        assert_eq!(h.statuses(), vec![JobStatus::Running, JobStatus::Failed]);
    }

    #[tokio::test]
    async fn final_upload_carries_the_full_log() {
        let h = Harness::new();
        let exec = FakeExecutor::exiting(0).with_lines(&["step 1", "step 2", "step 3"]);

        h.run(FakeDownloader::ok(), exec.clone(), true).await;

        let target = exec.last_target().unwrap();
        assert!(target.exists());
        let on_disk = std::fs::read(target.join(JOB_LOG_FILE)).unwrap();
        assert_eq!(h.blob.last_body().unwrap(), on_disk);

        let text = String::from_utf8(on_disk).unwrap();
        assert!(text.contains("Agent server: https://srv.example (OnPremise)"));
        assert!(text.contains("step 3"));
        assert!(text.contains("Job finished with exit code 0."));
    }

    #[tokio::test]
    async fn rejected_job_is_claimed_then_failed_without_running() {
        let h = Harness::new();
        let permit = h.gate.try_admit().unwrap();

        let status = JobPipeline::rejected(
            h.session(),
            h.blob.clone(),
            h.settings(true),
            JobId::from("42"),
            "9".into(),
            "job 42: missing field 'parameter.downloadUrl'".into(),
        )
        .run(permit)
        .await;

        assert_eq!(status, JobStatus::Failed);
        assert_eq!(h.statuses(), vec![JobStatus::Running, JobStatus::Failed]);
        assert_eq!(h.gate.load().in_flight, 0);

        let text = String::from_utf8(h.blob.last_body().unwrap()).unwrap();
        assert!(text.contains("missing field 'parameter.downloadUrl'"));
    }

    #[tokio::test]
    async fn reports_are_uploaded_after_execution() {
        let h = Harness::new();
        let exec = FakeExecutor::exiting(1).writing("out/suite.xml", "<testsuite/>");
        let workload = Workload::new(Box::new(FakeDownloader::ok()), Box::new(exec))
            .with_reports(ReportSpec {
                dir: PathBuf::from("out"),
                pattern: "**/*.xml".into(),
                session_id: Some("s-1".into()),
            });

        let status = h.run_workload(workload, false).await;

        assert_eq!(status, JobStatus::Failed);
        let reports: Vec<_> = h
            .fake
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SaveReport(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].file_name, "suite.xml");
        assert!(reports[0].is_end);
    }

    #[tokio::test]
    async fn report_upload_failure_keeps_the_exit_status() {
        let h = Harness::new();
        let exec = FakeExecutor::exiting(0).writing("out/suite.xml", "<testsuite/>");
        let workload = Workload::new(Box::new(FakeDownloader::ok()), Box::new(exec))
            .with_reports(ReportSpec {
                dir: PathBuf::from("out"),
                pattern: "[".into(),
                session_id: None,
            });

        let status = h.run_workload(workload, false).await;
        assert_eq!(status, JobStatus::Success);
        assert_eq!(h.statuses(), vec![JobStatus::Running, JobStatus::Success]);
    }
}
