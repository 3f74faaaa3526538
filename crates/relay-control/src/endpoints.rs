pub(crate) const BUILD_INFO: &str = "info";
pub(crate) const TOKEN: &str = "oauth/token";
pub(crate) const UPLOAD_URL: &str = "api/v1/files/upload-url";
pub(crate) const AGENT: &str = "api/v1/agent/";
pub(crate) const GET_JOB: &str = "api/v1/jobs/get-job";
pub(crate) const UPDATE_JOB: &str = "api/v1/jobs/update-job";
pub(crate) const SAVE_LOG: &str = "api/v1/jobs/save-log";
pub(crate) const JUNIT_REPORTS: &str = "api/v1/junit/test-reports";

pub(crate) fn notify_job(job_id: &str) -> String {
    format!("api/v1/jobs/{job_id}/notify")
}
