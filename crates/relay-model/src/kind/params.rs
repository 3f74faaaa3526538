use serde::{Deserialize, Serialize};

/// Parameters for the external test runner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeRunnerParams {
    /// Extra runner arguments supplied by the job author.
    pub command: String,
    /// Runner version to install when no explicit location is given.
    pub runner_version: Option<String>,
    /// Pre-installed runner directory; skips installation when set.
    pub runner_location: Option<String>,
}

/// Parameters for a script job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericScriptParams {
    /// Script body written verbatim to the working area.
    pub script: String,
    pub session_id: Option<String>,
}
