use std::path::{Path, PathBuf};

use async_trait::async_trait;
use relay_core::{BuildContext, ExecError, Executor, JobLog};
use relay_model::NativeRunnerParams;
use serde_json::json;

use crate::{
    install::RunnerInstalls,
    proc::ShellCommand,
    util::{self, Flag},
};

const PROJECT_PATTERN: &str = "**/*.prj";
const PROPERTIES_FILE: &str = "relay.integration.properties";

pub const DEFAULT_EXECUTABLES: [&str; 4] = ["relayc", "relayc.exe", "relay-runner", "relay-runner.exe"];

/// Runs the native test runner against the single project found in the working area.
pub struct NativeRunnerExecutor {
    params: NativeRunnerParams,
    project_id: String,
    team_id: String,
    ctx: BuildContext,
    executables: Vec<String>,
    installs: RunnerInstalls,
}

impl NativeRunnerExecutor {
    pub fn new(
        params: NativeRunnerParams,
        project_id: impl Into<String>,
        team_id: impl Into<String>,
        ctx: BuildContext,
        executables: Vec<String>,
        installs: RunnerInstalls,
    ) -> Self {
        let executables = if executables.is_empty() {
            DEFAULT_EXECUTABLES.iter().map(|s| s.to_string()).collect()
        } else {
            executables
        };
        Self {
            params,
            project_id: project_id.into(),
            team_id: team_id.into(),
            ctx,
            executables,
            installs,
        }
    }

    /// The job's command with the credential flags it does not carry yet.
    pub fn runner_args(&self) -> String {
        if self.ctx.is_on_premise() {
            util::merge_flags(
                &self.params.command,
                &[Flag::with("-apiKeyOnPremise", &self.ctx.api_key)],
            )
        } else {
            util::merge_flags(
                &self.params.command,
                &[
                    Flag::with("-apiKey", &self.ctx.api_key),
                    Flag::with("-serverUrl", &self.ctx.server_url),
                ],
            )
        }
    }

    pub fn command_line(&self, executable: &Path, project: &Path) -> String {
        let project = project.display().to_string();
        let base = util::merge_flags(
            &util::quote_if_spaced(executable),
            &[
                Flag::bare("-noSplash"),
                Flag::with("-runMode", "console"),
                Flag::with("-projectPath", &project),
            ],
        );
        let args = self.runner_args();
        if args.is_empty() {
            base
        } else {
            format!("{base} {args}")
        }
    }

    fn integration_properties(&self) -> Vec<(&'static str, String)> {
        let on_premise = self.ctx.is_on_premise();
        vec![
            ("integration.enable", "true".to_string()),
            ("integration.server.endpoint", self.ctx.server_url.clone()),
            ("integration.authentication.email", self.ctx.email.clone()),
            ("integration.authentication.token", self.ctx.token.clone()),
            ("integration.team", json!({ "id": self.team_id }).to_string()),
            ("integration.project", json!({ "id": self.project_id }).to_string()),
            ("integration.onpremise.enable", on_premise.to_string()),
            ("integration.onpremise.server", self.ctx.server_url.clone()),
        ]
    }

    fn find_executable(&self, home: &Path) -> Result<PathBuf, ExecError> {
        for name in &self.executables {
            if let Some(found) = util::find_file(home, name)? {
                return Ok(found);
            }
        }
        Err(ExecError::RunnerNotFound(format!(
            "no runner executable in {}",
            home.display()
        )))
    }
}

fn find_projects(target: &Path) -> Result<Vec<PathBuf>, ExecError> {
    let pattern = format!(
        "{}/{PROJECT_PATTERN}",
        glob::Pattern::escape(&target.display().to_string())
    );
    let paths = glob::glob(&pattern).map_err(|e| ExecError::Io(e.to_string()))?;
    let mut found = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| ExecError::Io(e.to_string()))?;
        if path.is_file() {
            found.push(path);
        }
    }
    Ok(found)
}

#[async_trait]
impl Executor for NativeRunnerExecutor {
    async fn execute(&self, log: &JobLog, target: &Path) -> Result<i32, ExecError> {
        let projects = find_projects(target)?;
        let project = match projects.as_slice() {
            [] => {
                log.error("Unable to find a project file.").await;
                return Ok(1);
            }
            [one] => one,
            many => {
                let list = many
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                log.error(format!("Multiple project files are found: {list}."))
                    .await;
                return Ok(1);
            }
        };

        log.debug("Configure server integration.").await;
        let project_dir = project.parent().unwrap_or(target);
        let properties = project_dir.join("settings").join("internal").join(PROPERTIES_FILE);
        util::write_properties(&properties, &self.integration_properties()).await?;

        let home = self
            .installs
            .resolve(
                log,
                self.params.runner_version.as_deref(),
                self.params.runner_location.as_deref(),
            )
            .await?;
        log.info(format!("Runner folder: {}", home.display())).await;

        let executable = self.find_executable(&home)?;
        log.info(format!("Runner executable: {}", executable.display()))
            .await;
        util::make_executable(&executable).await?;

        let line = self.command_line(&executable, project);
        let shown = util::mask_flag(&util::mask_flag(&line, "-apiKey"), "-apiKeyOnPremise");
        log.info(format!("Execute runner: {shown}")).await;

        ShellCommand::new(line, target)
            .shown_as(shown)
            .display(self.ctx.x11_display.clone(), self.ctx.xvfb_run.clone())
            .run(log)
            .await
    }
}
