use std::path::Path;

use async_trait::async_trait;
use relay_core::{DownloadError, Downloader, JobLog};
use tokio::process::Command;
use tracing::{debug, warn};

const ARCHIVE_FILE: &str = ".relay-download.zip";

/// Entries skipped when unpacking a test project.
const PROJECT_EXCLUDES: [&str; 2] = ["*.git/*", "*__MACOSX*"];

/// Fetches a zip archive over HTTP and unpacks it into the target directory.
#[derive(Debug, Clone)]
pub struct ArchiveDownloader {
    client: reqwest::Client,
    url: String,
    bearer: Option<String>,
    project: bool,
}

impl ArchiveDownloader {
    /// Project archive: VCS metadata and macOS resource forks are skipped.
    pub fn project(client: reqwest::Client, url: impl Into<String>, bearer: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            bearer,
            project: true,
        }
    }

    /// Plain archive, unpacked as is.
    pub fn plain(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            bearer: None,
            project: false,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn sends_bearer(&self) -> bool {
        self.bearer.is_some()
    }

    async fn fetch(&self) -> Result<Vec<u8>, DownloadError> {
        let mut req = self.client.get(&self.url);
        if let Some(token) = &self.bearer {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| DownloadError::Fetch(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DownloadError::Fetch(format!(
                "{} returned {}",
                self.url,
                status.as_u16()
            )));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| DownloadError::Fetch(e.to_string()))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Downloader for ArchiveDownloader {
    async fn download(&self, log: &JobLog, target: &Path) -> Result<(), DownloadError> {
        log.info(format!("Downloading from {}. It may take a few minutes.", self.url))
            .await;
        let body = self.fetch().await?;

        tokio::fs::create_dir_all(target).await?;
        let archive = target.join(ARCHIVE_FILE);
        log.debug(format!("Download into temporary file: {}", archive.display()))
            .await;
        tokio::fs::write(&archive, &body).await?;

        let excludes: &[&str] = if self.project { &PROJECT_EXCLUDES } else { &[] };
        let extracted = extract_zip(log, &archive, target, excludes).await;
        if let Err(e) = tokio::fs::remove_file(&archive).await {
            warn!(path = %archive.display(), error = %e, "cannot remove downloaded archive");
        }
        extracted
    }
}

/// Unpacks `archive` into `target` with the system `unzip`, leaving out entries matching `excludes`.
pub async fn extract_zip(
    log: &JobLog,
    archive: &Path,
    target: &Path,
    excludes: &[&str],
) -> Result<(), DownloadError> {
    log.info(format!(
        "Decompressing the {} into {}.",
        archive.display(),
        target.display()
    ))
    .await;

    let mut cmd = Command::new("unzip");
    cmd.arg("-q").arg("-o").arg(archive).arg("-d").arg(target);
    if !excludes.is_empty() {
        cmd.arg("-x").args(excludes);
    }
    debug!(archive = %archive.display(), target = %target.display(), "unzip");

    let output = cmd
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| DownloadError::Extract(format!("unzip: {e}")))?;
    // unzip exits 11 when every entry is excluded
    match output.status.code() {
        Some(0) | Some(11) => Ok(()),
        _ => Err(DownloadError::Extract(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        )),
    }
}
