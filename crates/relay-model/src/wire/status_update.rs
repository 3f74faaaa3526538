use serde::{Deserialize, Serialize};

use crate::domain::{JobId, JobStatus};

/// Body of `update-job`.
///
/// `start_time` accompanies `RUNNING`, `stop_time` accompanies a terminal status. Timestamps are RFC 3339.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_time: Option<String>,
}

impl StatusUpdate {
    /// Builds the update for `status`, stamping `at` into the field that matches it.
    pub fn new(id: JobId, status: JobStatus, at: String) -> Self {
        let (start_time, stop_time) = match status {
            JobStatus::Running => (Some(at), None),
            s if s.is_terminal() => (None, Some(at)),
            _ => (None, None),
        };
        Self {
            id,
            status,
            start_time,
            stop_time,
        }
    }
}
