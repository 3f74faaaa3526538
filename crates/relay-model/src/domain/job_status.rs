use serde::{Deserialize, Serialize};

/// Lifecycle state of a job as reported to the control server.
///
/// Transitions are monotonic: `Queued -> Running -> {Success | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting on the server for an agent to pick it up.
    Queued,
    /// Claimed by an agent and executing.
    Running,
    /// Executor exited with status 0.
    Success,
    /// Executor exited non-zero, or an infrastructure fault occurred.
    Failed,
}

impl JobStatus {
    /// Maps an executor exit status onto a terminal status.
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            JobStatus::Success
        } else {
            JobStatus::Failed
        }
    }

    /// Returns `true` for `Success` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }

    /// Returns `true` if `next` is the immediate successor of `self`.
    ///
    /// `Running` can never be skipped and terminal states never move.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Success)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_map_to_terminal_status() {
        assert_eq!(JobStatus::from_exit_code(0), JobStatus::Success);
        assert_eq!(JobStatus::from_exit_code(2), JobStatus::Failed);
        assert_eq!(JobStatus::from_exit_code(-1), JobStatus::Failed);
    }

    #[test]
    fn transitions_are_monotonic() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Success));
        assert!(!JobStatus::Success.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Success));
    }

    #[test]
    fn wire_names_are_upper_case() {
        let json = serde_json::to_string(&JobStatus::Running).unwrap();
        assert_eq!(json, r#""RUNNING""#);
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}
