use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use relay_model::JobId;
use tokio::{
    fs::File,
    io::AsyncWriteExt,
    sync::{Mutex, watch},
};
use tracing::{Level, debug, warn};

use crate::timefmt;

/// Per-job log file.
///
/// Every record is appended as `[<rfc3339>] [<LEVEL>]: <message>` and mirrored to the
/// operational log at `debug` under the `relay::job` target. Each write bumps a counter
/// observable through [`subscribe`](Self::subscribe). Write failures are logged and swallowed.
#[derive(Clone)]
pub struct JobLog {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    job_id: JobId,
    file: Mutex<File>,
    writes: watch::Sender<u64>,
}

impl JobLog {
    pub async fn create(path: impl Into<PathBuf>, job_id: JobId) -> io::Result<Self> {
        let path = path.into();
        let file = File::create(&path).await?;
        let (writes, _) = watch::channel(0);
        Ok(Self {
            inner: Arc::new(Inner {
                path,
                job_id,
                file: Mutex::new(file),
                writes,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn job_id(&self) -> &JobId {
        &self.inner.job_id
    }

    /// Receiver of the write counter; the current value is already marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.writes.subscribe()
    }

    pub fn writes(&self) -> u64 {
        *self.inner.writes.borrow()
    }

    pub async fn info(&self, msg: impl AsRef<str>) {
        self.write(Level::INFO, msg.as_ref()).await;
    }

    pub async fn debug(&self, msg: impl AsRef<str>) {
        self.write(Level::DEBUG, msg.as_ref()).await;
    }

    pub async fn warn(&self, msg: impl AsRef<str>) {
        self.write(Level::WARN, msg.as_ref()).await;
    }

    pub async fn error(&self, msg: impl AsRef<str>) {
        self.write(Level::ERROR, msg.as_ref()).await;
    }

    pub async fn write(&self, level: Level, msg: &str) {
        debug!(target: "relay::job", job_id = %self.inner.job_id, job_level = %level, "{msg}");

        let line = format!("[{}] [{}]: {}\n", timefmt::now_rfc3339(), level, msg);
        {
            let mut file = self.inner.file.lock().await;
            let written = match file.write_all(line.as_bytes()).await {
                Ok(()) => file.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                warn!(job_id = %self.inner.job_id, error = %e, "job log write failed");
                return;
            }
        }
        self.inner.writes.send_modify(|n| *n += 1);
    }

    /// Full file content, read while no record is being appended.
    pub async fn snapshot(&self) -> io::Result<Vec<u8>> {
        let _guard = self.inner.file.lock().await;
        tokio::fs::read(&self.inner.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_are_formatted_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let log = JobLog::create(dir.path().join("debug.log"), JobId::from("9"))
            .await
            .unwrap();
        let rx = log.subscribe();

        log.info("Agent user: qa@example.com").await;
        log.error("boom").await;

        let text = String::from_utf8(log.snapshot().await.unwrap()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] [INFO]: Agent user: qa@example.com"));
        assert!(lines[1].ends_with("] [ERROR]: boom"));
        assert_eq!(*rx.borrow(), 2);
        assert_eq!(log.writes(), 2);
    }
}
