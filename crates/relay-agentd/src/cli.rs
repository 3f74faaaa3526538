use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use relay_core::{AgentConfig, ConfigStore};

#[derive(Debug, Parser)]
#[command(name = "relay-agent", version, about = "Remote execution agent")]
pub struct Cli {
    /// Agent config file.
    #[arg(long = "config", short = 'c', global = true, default_value = ConfigStore::DEFAULT_FILE)]
    pub config: PathBuf,

    /// Operational log output: text, json or journald.
    #[arg(long = "log-format", global = true, default_value = "text")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write the given values into the config file.
    Config(ConfigArgs),
    /// Poll the control server for jobs, or run one job file with `--ci`.
    #[command(alias = "start-agent")]
    Start(StartArgs),
}

#[derive(Debug, Args)]
pub struct StartArgs {
    #[command(flatten)]
    pub values: ConfigArgs,

    /// Run the job described in the job file once and exit.
    #[arg(long)]
    pub ci: bool,

    #[arg(long = "job-file", default_value = "job.json")]
    pub job_file: PathBuf,
}

/// Values that override the config file.
#[derive(Debug, Default, Args)]
pub struct ConfigArgs {
    #[arg(long = "server-url", short = 's')]
    pub server_url: Option<String>,
    #[arg(long, short = 'u')]
    pub email: Option<String>,
    #[arg(long = "api-key", short = 'k')]
    pub api_key: Option<String>,
    #[arg(long = "team-id", short = 't')]
    pub team_id: Option<String>,
    #[arg(long = "agent-name", short = 'a')]
    pub agent_name: Option<String>,
    #[arg(long = "x11-display")]
    pub x11_display: Option<String>,
    #[arg(long = "xvfb-run")]
    pub xvfb_run: Option<String>,
    #[arg(long)]
    pub proxy: Option<String>,
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
    #[arg(long = "keep-files")]
    pub keep_files: Option<bool>,
}

impl ConfigArgs {
    pub fn overrides(&self) -> AgentConfig {
        AgentConfig {
            server_url: self.server_url.clone(),
            email: self.email.clone(),
            api_key: self.api_key.clone(),
            team_id: self.team_id.clone(),
            agent_name: self.agent_name.clone(),
            x11_display: self.x11_display.clone(),
            xvfb_run: self.xvfb_run.clone(),
            proxy: self.proxy.clone(),
            log_level: self.log_level.clone(),
            keep_files: self.keep_files,
            ..AgentConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "relay-agent",
            "start",
            "--server-url",
            "https://srv.example",
            "-k",
            "key-1",
            "--keep-files",
            "true",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("agentconfig"));

        let Command::Start(args) = cli.command else {
            panic!("expected start");
        };
        assert!(!args.ci);
        assert_eq!(args.job_file, PathBuf::from("job.json"));

        let over = args.values.overrides();
        assert_eq!(over.server_url.as_deref(), Some("https://srv.example"));
        assert_eq!(over.api_key.as_deref(), Some("key-1"));
        assert_eq!(over.keep_files, Some(true));
        assert!(over.email.is_none());
    }

    #[test]
    fn ci_mode_and_global_config() {
        let cli = Cli::try_parse_from([
            "relay-agent",
            "start-agent",
            "--ci",
            "--job-file",
            "/jobs/one.json",
            "--config",
            "/etc/relay/agentconfig",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/relay/agentconfig"));
        let Command::Start(args) = cli.command else {
            panic!("expected start");
        };
        assert!(args.ci);
        assert_eq!(args.job_file, PathBuf::from("/jobs/one.json"));
    }

    #[test]
    fn config_command_parses() {
        let cli = Cli::try_parse_from(["relay-agent", "config", "--team-id", "7"]).unwrap();
        let Command::Config(args) = cli.command else {
            panic!("expected config");
        };
        assert_eq!(args.overrides().team_id.as_deref(), Some("7"));
    }
}
