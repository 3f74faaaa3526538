use serde::{Deserialize, Serialize};

use crate::domain::JobId;
use crate::error::ModelError;
use crate::kind::{
    GenericScriptParams, GitRepository, JobDescriptor, JobKind, NativeRunnerParams, ProjectSource,
};

/// Job as returned by `get-job`, and as stored in the CI-mode job file.
///
/// The server answers with an empty object (or one missing `parameter`/`testProject`) when no work is queued.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    #[serde(default)]
    pub id: Option<JobId>,
    #[serde(default)]
    pub parameter: Option<JobParameter>,
    #[serde(default)]
    pub test_project: Option<TestProject>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobParameter {
    /// `GIT` or `DOWNLOAD`.
    #[serde(rename = "type", default)]
    pub source_type: Option<String>,
    /// `GENERIC_COMMAND` selects the script executor; anything else runs the native runner.
    #[serde(default)]
    pub config_type: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub runner_version: Option<String>,
    #[serde(default)]
    pub runner_location: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub git_repository_resource: Option<GitResource>,
    #[serde(default, deserialize_with = "crate::wire::lenient::opt_id")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitResource {
    pub repository: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestProject {
    #[serde(default, deserialize_with = "crate::wire::lenient::opt_id")]
    pub project_id: Option<String>,
}

const SOURCE_GIT: &str = "GIT";
const SOURCE_DOWNLOAD: &str = "DOWNLOAD";
const CONFIG_GENERIC: &str = "GENERIC_COMMAND";

impl JobRecord {
    /// Converts the wire record into an immutable descriptor.
    ///
    /// Returns `Ok(None)` when the record carries no work. A record that carries work but lacks a field required by its kind is an error.
    pub fn into_descriptor(self, team_id: &str) -> Result<Option<JobDescriptor>, ModelError> {
        let (Some(parameter), Some(project)) = (self.parameter, self.test_project) else {
            return Ok(None);
        };

        let job: String = self
            .id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        let missing = |field: &'static str| ModelError::MissingField {
            job: job.clone(),
            field,
        };

        let id = self.id.clone().ok_or_else(|| missing("id"))?;
        let project_id = project.project_id.ok_or_else(|| missing("testProject.projectId"))?;

        let source = match parameter.source_type.as_deref().unwrap_or(SOURCE_DOWNLOAD) {
            SOURCE_GIT => {
                let res = parameter
                    .git_repository_resource
                    .ok_or_else(|| missing("parameter.gitRepositoryResource"))?;
                ProjectSource::Git(GitRepository {
                    repository: res.repository,
                    branch: res.branch,
                    username: res.username,
                    password: res.password,
                })
            }
            SOURCE_DOWNLOAD => ProjectSource::Archive {
                url: parameter
                    .download_url
                    .ok_or_else(|| missing("parameter.downloadUrl"))?,
            },
            other => {
                return Err(ModelError::UnsupportedSource {
                    job,
                    source_type: other.to_string(),
                });
            }
        };

        let command = parameter.command.unwrap_or_default();
        let kind = if parameter.config_type.as_deref() == Some(CONFIG_GENERIC) {
            JobKind::GenericScript(GenericScriptParams {
                script: command,
                session_id: parameter.session_id,
            })
        } else {
            JobKind::NativeRunner(NativeRunnerParams {
                command,
                runner_version: parameter.runner_version,
                runner_location: parameter.runner_location,
            })
        };

        Ok(Some(JobDescriptor {
            id,
            project_id,
            team_id: team_id.to_string(),
            kind,
            source,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_response_means_no_job() {
        let rec: JobRecord = serde_json::from_str("{}").unwrap();
        assert_eq!(rec.into_descriptor("7").unwrap(), None);

        let rec: JobRecord = serde_json::from_str(r#"{"id": 1, "parameter": {}}"#).unwrap();
        assert_eq!(rec.into_descriptor("7").unwrap(), None);
    }

    #[test]
    fn download_job_becomes_native_runner() {
        let rec: JobRecord = serde_json::from_str(
            r#"{
                "id": 42,
                "parameter": {
                    "type": "DOWNLOAD",
                    "configType": "KATALON",
                    "command": "-retry=0 -testSuitePath=\"Test Suites/Smoke\"",
                    "runnerVersion": "9.0.0",
                    "downloadUrl": "https://srv.example/api/v1/files/dl/1"
                },
                "testProject": { "projectId": 9 }
            }"#,
        )
        .unwrap();

        let job = rec.into_descriptor("7").unwrap().unwrap();
        assert_eq!(job.id.as_str(), "42");
        assert_eq!(job.project_id, "9");
        assert_eq!(job.team_id, "7");
        assert_eq!(
            job.source,
            ProjectSource::Archive {
                url: "https://srv.example/api/v1/files/dl/1".into()
            }
        );
        match job.kind {
            JobKind::NativeRunner(p) => {
                assert_eq!(p.runner_version.as_deref(), Some("9.0.0"));
                assert!(p.command.starts_with("-retry=0"));
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn git_generic_command_becomes_script() {
        let rec: JobRecord = serde_json::from_str(
            r#"{
                "id": "a1",
                "parameter": {
                    "type": "GIT",
                    "configType": "GENERIC_COMMAND",
                    "command": "echo hi",
                    "sessionId": 5,
                    "gitRepositoryResource": {
                        "repository": "https://git.example/acme/tests.git",
                        "branch": "refs/heads/main"
                    }
                },
                "testProject": { "projectId": "p" }
            }"#,
        )
        .unwrap();

        let job = rec.into_descriptor("t").unwrap().unwrap();
        assert!(matches!(job.source, ProjectSource::Git(ref g) if g.branch.as_deref() == Some("refs/heads/main")));
        assert_eq!(
            job.kind,
            JobKind::GenericScript(GenericScriptParams {
                script: "echo hi".into(),
                session_id: Some("5".into()),
            })
        );
    }

    #[test]
    fn git_without_repository_is_rejected() {
        let rec: JobRecord = serde_json::from_str(
            r#"{"id": 3, "parameter": {"type": "GIT"}, "testProject": {"projectId": 1}}"#,
        )
        .unwrap();
        let err = rec.into_descriptor("t").unwrap_err();
        assert_eq!(
            err,
            ModelError::MissingField {
                job: "3".into(),
                field: "parameter.gitRepositoryResource"
            }
        );
    }

    #[test]
    fn unknown_source_type_is_rejected() {
        let rec: JobRecord = serde_json::from_str(
            r#"{"id": 3, "parameter": {"type": "FTP"}, "testProject": {"projectId": 1}}"#,
        )
        .unwrap();
        assert!(matches!(
            rec.into_descriptor("t"),
            Err(ModelError::UnsupportedSource { .. })
        ));
    }
}
