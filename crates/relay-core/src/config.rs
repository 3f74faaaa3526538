//! Persisted agent configuration.
//!
//! A flat TOML table read from disk on every acquisition tick. Keys the agent does not
//! know are carried through untouched when the file is rewritten.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{credential::Login, error::CoreError, timefmt};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    /// Name reported in heartbeats; the hostname is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Agent identity, generated on first start and persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Keep working areas after the job completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_files: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x11_display: Option<String>,
    /// Arguments for `xvfb-run`; enables the virtual framebuffer wrapper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xvfb_run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Executable names searched for inside a runner install.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_executables: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_index_url: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

macro_rules! overlay {
    ($base:ident, $over:ident; $($field:ident),* $(,)?) => {
        $( if $over.$field.is_some() { $base.$field = $over.$field.clone(); } )*
    };
}

impl AgentConfig {
    /// Returns `self` with every value set in `over` taking precedence.
    pub fn merged(&self, over: &AgentConfig) -> AgentConfig {
        let mut out = self.clone();
        overlay!(out, over;
            server_url, email, api_key, team_id, agent_name, uuid, log_level,
            keep_files, x11_display, xvfb_run, proxy, runner_executables, release_index_url,
        );
        for (k, v) in &over.extra {
            out.extra.insert(k.clone(), v.clone());
        }
        out
    }

    pub fn missing_required(&self) -> Vec<&'static str> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        let mut missing = Vec::new();
        if !present(&self.email) {
            missing.push("email");
        }
        if !present(&self.api_key) {
            missing.push("api_key");
        }
        if !present(&self.server_url) {
            missing.push("server_url");
        }
        if !present(&self.team_id) {
            missing.push("team_id");
        }
        missing
    }

    /// Logs one error per missing required key. Returns `true` when nothing is missing.
    pub fn validate(&self, source: &Path) -> bool {
        let missing = self.missing_required();
        for key in &missing {
            error!(key, file = %source.display(), "required config key missing");
        }
        missing.is_empty()
    }

    pub fn keep_files(&self) -> bool {
        self.keep_files.unwrap_or(false)
    }

    pub fn login(&self) -> Login {
        Login {
            email: self.email.clone().unwrap_or_default(),
            password: self.api_key.clone().unwrap_or_default(),
        }
    }

    /// Generates an agent uuid when none is set. Returns `true` if one was generated.
    pub fn ensure_uuid(&mut self) -> bool {
        if self.uuid.as_deref().is_some_and(|u| !u.is_empty()) {
            return false;
        }
        self.uuid = Some(timefmt::stamped_id());
        true
    }
}

/// File-backed store for [`AgentConfig`].
///
/// No locking: concurrent external edits resolve last-write-wins.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub const DEFAULT_FILE: &'static str = "agentconfig";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file, creating an empty one when it does not exist yet.
    pub async fn load(&self) -> Result<AgentConfig, CoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.ensure_parent().await?;
                tokio::fs::write(&self.path, b"")
                    .await
                    .map_err(|e| self.io_error("create", e))?;
                String::new()
            }
            Err(e) => return Err(self.io_error("read", e)),
        };

        toml::from_str(&raw)
            .map_err(|e| CoreError::Config(format!("{}: {e}", self.path.display())))
    }

    /// Writes the config atomically: a sibling temp file is written, then renamed over the target.
    pub async fn save(&self, config: &AgentConfig) -> Result<(), CoreError> {
        let body = toml::to_string_pretty(config)
            .map_err(|e| CoreError::Config(format!("serialize: {e}")))?;

        self.ensure_parent().await?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| self.io_error("write", e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error("rename", e))?;

        debug!(path = %self.path.display(), "config saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn ensure_parent(&self) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error("create dir", e))?;
        }
        Ok(())
    }

    fn io_error(&self, op: &str, e: std::io::Error) -> CoreError {
        CoreError::Config(format!("{op} {}: {e}", self.path.display()))
    }
}
