use serde::{Deserialize, Serialize};

/// One entry of the runner release index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerRelease {
    pub version: String,
    /// `Linux`, `macOS (app)` or `Windows 64`, matching [`AgentInfo::os`](crate::AgentInfo).
    pub os: String,
    pub url: String,
}

impl RunnerRelease {
    /// Picks the release matching `version` and `os` from an index.
    pub fn select<'a>(index: &'a [RunnerRelease], version: &str, os: &str) -> Option<&'a RunnerRelease> {
        index.iter().find(|r| r.version == version && r.os == os)
    }
}
