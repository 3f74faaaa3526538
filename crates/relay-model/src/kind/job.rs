use serde::{Deserialize, Serialize};

use crate::domain::{JobId, ProjectId, TeamId};
use crate::kind::{GenericScriptParams, NativeRunnerParams, ProjectSource};

/// A unit of work handed to the agent by the control server.
///
/// Immutable once built; a pipeline owns it for the duration of the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    pub id: JobId,
    pub project_id: ProjectId,
    pub team_id: TeamId,
    /// How the project is executed once it is on disk.
    pub kind: JobKind,
    /// Where the project comes from.
    pub source: ProjectSource,
}

/// Execution strategy for a job.
///
/// Selected once when the job is received; the matching executor is built from it and never re-inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum JobKind {
    /// Run the external test runner against the downloaded project.
    NativeRunner(NativeRunnerParams),
    /// Run an arbitrary script body inside the working area.
    GenericScript(GenericScriptParams),
}

impl JobKind {
    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::NativeRunner(_) => "native-runner",
            JobKind::GenericScript(_) => "generic-script",
        }
    }
}
