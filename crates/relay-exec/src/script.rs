use std::path::Path;

use async_trait::async_trait;
use relay_core::{ExecError, Executor, JobLog};
use relay_model::GenericScriptParams;
use tracing::debug;

use crate::{proc::ShellCommand, util};

#[cfg(windows)]
const SCRIPT_FILE: &str = "script.bat";
#[cfg(not(windows))]
const SCRIPT_FILE: &str = "script.sh";

pub const OUTPUT_DIR: &str = "relay-agent-output";

/// Writes the job's script into the working area and runs it.
///
/// The child sees `RELAY_WORKING_DIR` and `RELAY_OUTPUT_DIR`.
pub struct GenericScriptExecutor {
    params: GenericScriptParams,
}

impl GenericScriptExecutor {
    pub fn new(params: GenericScriptParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl Executor for GenericScriptExecutor {
    async fn execute(&self, log: &JobLog, target: &Path) -> Result<i32, ExecError> {
        let script = target.join(SCRIPT_FILE);
        tokio::fs::write(&script, &self.params.script).await?;
        util::make_executable(&script).await?;

        let output = target.join(OUTPUT_DIR);
        tokio::fs::create_dir_all(&output).await?;
        debug!(session_id = ?self.params.session_id, script = %script.display(), "generic script");

        log.info(format!("Executing commands inside {}", script.display()))
            .await;
        log.debug(format!("Executing following command(s)\n{}", self.params.script))
            .await;

        ShellCommand::new(util::quote_if_spaced(&script), target)
            .env("RELAY_WORKING_DIR", target)
            .env("RELAY_OUTPUT_DIR", &output)
            .run(log)
            .await
    }
}
