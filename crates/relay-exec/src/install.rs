use std::path::{Path, PathBuf};

use relay_core::{ExecError, JobLog, system};
use relay_model::RunnerRelease;
use tracing::{debug, info, warn};

use crate::download::ArchiveDownloader;
use relay_core::Downloader;

const INSTALLED_MARKER: &str = ".installed";

/// Local cache of runner installs, one directory per version.
#[derive(Debug, Clone)]
pub struct RunnerInstalls {
    client: reqwest::Client,
    root: PathBuf,
    index_url: Option<String>,
}

impl RunnerInstalls {
    pub fn new(client: reqwest::Client, root: impl Into<PathBuf>, index_url: Option<String>) -> Self {
        Self {
            client,
            root: root.into(),
            index_url: index_url.filter(|u| !u.trim().is_empty()),
        }
    }

    /// `~/.relay/runners`, or `.relay/runners` when no home directory is known.
    pub fn default_root() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join(".relay")
            .join("runners")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_installed(dir: &Path) -> bool {
        dir.join(INSTALLED_MARKER).is_file()
    }

    /// Directory holding the runner: the explicit location, a cached install, or a fresh download.
    pub async fn resolve(
        &self,
        log: &JobLog,
        version: Option<&str>,
        location: Option<&str>,
    ) -> Result<PathBuf, ExecError> {
        if let Some(location) = location.filter(|l| !l.trim().is_empty()) {
            return Ok(PathBuf::from(location));
        }
        let version = version.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
            ExecError::RunnerNotFound("neither runner version nor location is set".into())
        })?;

        let dir = self.root.join(version);
        if Self::is_installed(&dir) {
            return Ok(dir);
        }

        let release = self.release(version).await?;
        info!(version, dir = %dir.display(), "installing runner");
        log.info(format!("Download runner {version} to {}.", dir.display()))
            .await;

        tokio::fs::create_dir_all(&self.root).await?;
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{version}-"))
            .tempdir_in(&self.root)?;
        ArchiveDownloader::plain(self.client.clone(), &release.url)
            .download(log, staging.path())
            .await
            .map_err(|e| ExecError::Install(e.to_string()))?;
        tokio::fs::write(staging.path().join(INSTALLED_MARKER), b"").await?;
        commit(staging.path(), &dir).await?;
        Ok(dir)
    }

    async fn release(&self, version: &str) -> Result<RunnerRelease, ExecError> {
        let index_url = self
            .index_url
            .as_deref()
            .ok_or_else(|| ExecError::Install("release_index_url is not configured".into()))?;

        let resp = self
            .client
            .get(index_url)
            .send()
            .await
            .map_err(|e| ExecError::Install(format!("release index: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ExecError::Install(format!(
                "release index returned {}",
                status.as_u16()
            )));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| ExecError::Install(format!("release index: {e}")))?;
        let index: Vec<RunnerRelease> = serde_json::from_slice(&body)
            .map_err(|e| ExecError::Install(format!("release index: {e}")))?;

        let os = system::os_label();
        RunnerRelease::select(&index, version, os)
            .cloned()
            .ok_or_else(|| ExecError::Install(format!("no runner {version} released for {os}")))
    }
}

/// Moves a complete install from `staging` to `dir`.
///
/// Concurrent installs of one version race on the rename; a loser keeps the winner's copy.
/// A leftover `dir` without the marker is replaced.
async fn commit(staging: &Path, dir: &Path) -> Result<(), ExecError> {
    if RunnerInstalls::is_installed(dir) {
        debug!(dir = %dir.display(), "runner installed concurrently");
        return Ok(());
    }
    if tokio::fs::try_exists(dir).await? {
        warn!(dir = %dir.display(), "replacing incomplete runner install");
        tokio::fs::remove_dir_all(dir).await?;
    }
    match tokio::fs::rename(staging, dir).await {
        Ok(()) => Ok(()),
        Err(_) if RunnerInstalls::is_installed(dir) => {
            debug!(dir = %dir.display(), "runner installed concurrently");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn job_log(dir: &Path) -> JobLog {
        JobLog::create(dir.join("debug.log"), "1".into()).await.unwrap()
    }

    #[tokio::test]
    async fn explicit_location_wins() {
        let dir = tempfile::tempdir().unwrap();
        let log = job_log(dir.path()).await;
        let installs = RunnerInstalls::new(reqwest::Client::new(), dir.path(), None);

        let found = installs
            .resolve(&log, Some("9.0.0"), Some("/opt/runner"))
            .await
            .unwrap();
        assert_eq!(found, PathBuf::from("/opt/runner"));
    }

    #[tokio::test]
    async fn cached_install_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let log = job_log(dir.path()).await;
        let cached = dir.path().join("9.0.0");
        std::fs::create_dir_all(&cached).unwrap();
        std::fs::write(cached.join(INSTALLED_MARKER), "").unwrap();

        let installs = RunnerInstalls::new(reqwest::Client::new(), dir.path(), None);
        let found = installs.resolve(&log, Some("9.0.0"), None).await.unwrap();
        assert_eq!(found, cached);
    }

    #[tokio::test]
    async fn missing_version_and_index_are_faults() {
        let dir = tempfile::tempdir().unwrap();
        let log = job_log(dir.path()).await;
        let installs = RunnerInstalls::new(reqwest::Client::new(), dir.path(), Some(" ".into()));

        assert!(matches!(
            installs.resolve(&log, None, None).await,
            Err(ExecError::RunnerNotFound(_))
        ));
        assert!(matches!(
            installs.resolve(&log, Some("9.0.0"), None).await,
            Err(ExecError::Install(_))
        ));
    }

    fn staged(root: &Path, name: &str, payload: &str) -> PathBuf {
        let staging = root.join(name);
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("relayc"), payload).unwrap();
        std::fs::write(staging.join(INSTALLED_MARKER), "").unwrap();
        staging
    }

    #[tokio::test]
    async fn commit_moves_the_staged_install() {
        let root = tempfile::tempdir().unwrap();
        let staging = staged(root.path(), ".9.0.0-a", "first");
        let dir = root.path().join("9.0.0");

        commit(&staging, &dir).await.unwrap();
        assert!(RunnerInstalls::is_installed(&dir));
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn second_install_keeps_the_first() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("9.0.0");
        let first = staged(root.path(), ".9.0.0-a", "first");
        let second = staged(root.path(), ".9.0.0-b", "second");

        commit(&first, &dir).await.unwrap();
        commit(&second, &dir).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.join("relayc")).unwrap(), "first");
    }

    #[tokio::test]
    async fn incomplete_install_is_replaced() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("9.0.0");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("partial"), "x").unwrap();
        let staging = staged(root.path(), ".9.0.0-a", "fresh");

        commit(&staging, &dir).await.unwrap();
        assert!(RunnerInstalls::is_installed(&dir));
        assert!(!dir.join("partial").exists());
    }
}
