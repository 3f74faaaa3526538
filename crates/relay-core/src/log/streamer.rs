use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use relay_model::UploadDestination;
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{control::BlobStore, log::JobLog, log::Throttle};

/// Side effect fired after every successful streamed upload.
#[async_trait]
pub trait UploadObserver: Send + Sync {
    async fn uploaded(&self);
}

/// Best-effort background uploader bound to one job log.
///
/// Each write event may trigger a PUT of the whole log file to the destination. Uploads
/// start on the leading edge of the throttle window only; writes landing inside a window
/// are picked up by a later write or by the forced upload at teardown.
pub struct LogStreamer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl LogStreamer {
    pub fn attach(
        log: &JobLog,
        destination: UploadDestination,
        blob: Arc<dyn BlobStore>,
        window: Duration,
        observer: Option<Arc<dyn UploadObserver>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let mut writes = log.subscribe();
        let log = log.clone();
        let stop = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut throttle = Throttle::new(window);
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    changed = writes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                if !throttle.try_begin(Instant::now()) {
                    trace!(job_id = %log.job_id(), "log upload throttled");
                    continue;
                }

                let body = match log.snapshot().await {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(job_id = %log.job_id(), error = %e, "cannot read job log for upload");
                        continue;
                    }
                };
                let size = body.len();
                match blob.put(&destination, body).await {
                    Ok(()) => {
                        trace!(job_id = %log.job_id(), bytes = size, "job log streamed");
                        if let Some(observer) = &observer {
                            observer.uploaded().await;
                        }
                    }
                    Err(e) => warn!(job_id = %log.job_id(), error = %e, "job log upload failed"),
                }
            }
            debug!(job_id = %log.job_id(), "log streamer stopped");
        });

        Self { cancel, handle }
    }

    /// Stops the background task and waits for an in-flight upload to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "log streamer task failed");
        }
    }
}
