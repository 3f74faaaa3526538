use relay_model::{JobId, JobStatus, StatusUpdate};
use tracing::{debug, warn};

use crate::{control::ControlSession, error::ControlError, timefmt};

/// Sends a job's status reports, forward only.
///
/// A report that does not follow the last one (skipping `Running`, or leaving a terminal
/// state) is dropped. The status counts as reached once attempted, even if the send fails.
pub(crate) struct StatusReporter {
    session: ControlSession,
    job_id: JobId,
    last: JobStatus,
}

impl StatusReporter {
    pub(crate) fn new(session: ControlSession, job_id: JobId) -> Self {
        Self {
            session,
            job_id,
            last: JobStatus::Queued,
        }
    }

    pub(crate) async fn advance(&mut self, next: JobStatus) -> Result<(), ControlError> {
        if !self.last.can_transition_to(next) {
            warn!(from = ?self.last, to = ?next, "status report out of order; dropped");
            return Ok(());
        }
        self.last = next;

        debug!(status = ?next, "updating job status");
        let update = StatusUpdate::new(self.job_id.clone(), next, timefmt::now_rfc3339());
        let update = &update;
        self.session
            .call(|c, t| async move { c.update_job(&t, update).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        credential::{CredentialManager, Login},
        testing::FakeControlPlane,
    };
    use std::{sync::Arc, time::Duration};

    fn reporter(fake: &Arc<FakeControlPlane>) -> StatusReporter {
        let creds = Arc::new(CredentialManager::new(
            fake.clone(),
            Login::default(),
            Duration::from_secs(10),
        ));
        StatusReporter::new(ControlSession::new(fake.clone(), creds), JobId::from("42"))
    }

    fn statuses(fake: &FakeControlPlane) -> Vec<JobStatus> {
        fake.updates().into_iter().map(|u| u.status).collect()
    }

    #[tokio::test]
    async fn terminal_without_claim_is_dropped() {
        let fake = FakeControlPlane::new();
        fake.grant_tokens(3600);
        let mut r = reporter(&fake);

        r.advance(JobStatus::Success).await.unwrap();
        assert!(statuses(&fake).is_empty());
    }

    #[tokio::test]
    async fn nothing_follows_a_terminal_report() {
        let fake = FakeControlPlane::new();
        fake.grant_tokens(3600);
        let mut r = reporter(&fake);

        r.advance(JobStatus::Running).await.unwrap();
        r.advance(JobStatus::Failed).await.unwrap();
        r.advance(JobStatus::Success).await.unwrap();
        r.advance(JobStatus::Running).await.unwrap();
        assert_eq!(statuses(&fake), vec![JobStatus::Running, JobStatus::Failed]);
    }

    #[tokio::test]
    async fn failed_claim_still_allows_the_terminal_report() {
        let fake = FakeControlPlane::new();
        fake.grant_tokens(3600);
        fake.fail_update_for(JobStatus::Running);
        let mut r = reporter(&fake);

        assert!(r.advance(JobStatus::Running).await.is_err());
        r.advance(JobStatus::Success).await.unwrap();
        assert_eq!(statuses(&fake), vec![JobStatus::Running, JobStatus::Success]);
    }
}
