use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use relay_core::{ExecError, JobLog};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
};
use tracing::{debug, trace, warn};

/// A command line run through the platform shell inside a directory.
///
/// Output lines of both streams are copied into the job log at `debug`.
/// The child is killed if the future running it is dropped.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    line: String,
    shown: Option<String>,
    cwd: PathBuf,
    env: Vec<(String, String)>,
    x11_display: Option<String>,
    xvfb_run: Option<String>,
}

impl ShellCommand {
    pub fn new(line: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            line: line.into(),
            shown: None,
            cwd: cwd.into(),
            env: Vec::new(),
            x11_display: None,
            xvfb_run: None,
        }
    }

    /// Text logged instead of the real line, for lines carrying secrets.
    pub fn shown_as(mut self, shown: impl Into<String>) -> Self {
        self.shown = Some(shown.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl AsRef<Path>) -> Self {
        self.env
            .push((key.into(), value.as_ref().display().to_string()));
        self
    }

    pub fn display(mut self, x11_display: Option<String>, xvfb_run: Option<String>) -> Self {
        self.x11_display = x11_display.filter(|s| !s.trim().is_empty());
        self.xvfb_run = xvfb_run.filter(|s| !s.trim().is_empty());
        self
    }

    /// Program and arguments handed to the OS.
    pub fn invocation(&self) -> (&'static str, Vec<String>) {
        Self::wrap(&self.line, self.x11_display.as_deref(), self.xvfb_run.as_deref())
    }

    #[cfg(windows)]
    fn wrap(line: &str, _x11: Option<&str>, _xvfb: Option<&str>) -> (&'static str, Vec<String>) {
        ("cmd", vec!["/c".to_string(), format!("\"{line}\"")])
    }

    #[cfg(not(windows))]
    fn wrap(line: &str, x11: Option<&str>, xvfb: Option<&str>) -> (&'static str, Vec<String>) {
        let mut line = line.to_string();
        if let Some(display) = x11 {
            line = format!("DISPLAY={display} {line}");
        }
        if let Some(xvfb) = xvfb {
            line = format!("xvfb-run {xvfb} {line}");
        }
        ("sh", vec!["-c".to_string(), line])
    }

    /// Runs to completion and returns the exit code.
    pub async fn run(&self, log: &JobLog) -> Result<i32, ExecError> {
        let (program, args) = self.invocation();
        let shown = match &self.shown {
            Some(shown) => {
                let (_, args) =
                    Self::wrap(shown, self.x11_display.as_deref(), self.xvfb_run.as_deref());
                args.join(" ")
            }
            None => args.join(" "),
        };
        log.info(format!(
            "Execute \"{program} {shown}\" in {}.",
            self.cwd.display()
        ))
        .await;
        trace!(program, cwd = %self.cwd.display(), "spawn");

        let mut cmd = Command::new(program);
        cmd.args(&args)
            .current_dir(&self.cwd)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecError::Spawn(format!("{program}: {e}")))?;

        let readers = [
            child.stdout.take().map(|s| tokio::spawn(copy_lines(s, log.clone()))),
            child.stderr.take().map(|s| tokio::spawn(copy_lines(s, log.clone()))),
        ];

        let status = child.wait().await?;
        for reader in readers.into_iter().flatten() {
            if let Err(e) = reader.await {
                warn!(error = %e, "output reader task failed");
            }
        }

        match status.code() {
            Some(code) => {
                debug!(code, "process exited");
                log.info(format!("Exit code: {code}.")).await;
                Ok(code)
            }
            None => {
                log.error("Process was terminated by a signal.").await;
                Err(ExecError::KilledBySignal)
            }
        }
    }
}

async fn copy_lines<R: AsyncRead + Unpin>(stream: R, log: JobLog) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log.debug(line).await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use relay_model::JobId;

    async fn job_log(dir: &Path) -> JobLog {
        JobLog::create(dir.join("debug.log"), JobId::from("1"))
            .await
            .unwrap()
    }

    async fn text(log: &JobLog) -> String {
        String::from_utf8(log.snapshot().await.unwrap()).unwrap()
    }

    #[test]
    fn display_and_xvfb_prefix_the_line() {
        let cmd = ShellCommand::new("run.sh", "/w")
            .display(Some(":99".into()), Some("-a -s '-screen 0 1024x768x24'".into()));
        let (program, args) = cmd.invocation();
        assert_eq!(program, "sh");
        assert_eq!(
            args,
            vec!["-c", "xvfb-run -a -s '-screen 0 1024x768x24' DISPLAY=:99 run.sh"]
        );

        let plain = ShellCommand::new("run.sh", "/w").display(Some(" ".into()), None);
        assert_eq!(plain.invocation().1, vec!["-c", "run.sh"]);
    }

    #[tokio::test]
    async fn output_lines_reach_the_job_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = job_log(dir.path()).await;

        let code = ShellCommand::new("echo out-line; echo err-line >&2; exit 3", dir.path())
            .run(&log)
            .await
            .unwrap();
        assert_eq!(code, 3);

        let text = text(&log).await;
        assert!(text.contains("[DEBUG]: out-line"));
        assert!(text.contains("[DEBUG]: err-line"));
        assert!(text.contains("Exit code: 3."));
    }

    #[tokio::test]
    async fn env_and_cwd_apply_to_child_only() {
        let dir = tempfile::tempdir().unwrap();
        let log = job_log(dir.path()).await;

        let code = ShellCommand::new("echo \"wd=$RELAY_TEST_DIR\"; pwd", dir.path())
            .env("RELAY_TEST_DIR", dir.path())
            .run(&log)
            .await
            .unwrap();
        assert_eq!(code, 0);
        assert!(std::env::var("RELAY_TEST_DIR").is_err());

        let text = text(&log).await;
        assert!(text.contains(&format!("wd={}", dir.path().display())));
    }

    #[tokio::test]
    async fn shown_line_replaces_secret_in_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = job_log(dir.path()).await;

        ShellCommand::new("true -apiKey=\"secret\"", dir.path())
            .shown_as("true -apiKey=***")
            .run(&log)
            .await
            .unwrap();
        let text = text(&log).await;
        assert!(!text.contains("secret"));
        assert!(text.contains("true -apiKey=***"));
    }

    #[tokio::test]
    async fn signal_termination_is_a_fault() {
        let dir = tempfile::tempdir().unwrap();
        let log = job_log(dir.path()).await;

        let err = ShellCommand::new("kill -9 $$", dir.path())
            .run(&log)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::KilledBySignal));
    }
}
