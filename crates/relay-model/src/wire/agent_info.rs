use serde::{Deserialize, Serialize};

/// Heartbeat body sent to `POST /api/v1/agent/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub uuid: String,
    pub name: String,
    pub team_id: String,
    pub hostname: String,
    pub ip: String,
    pub os: String,
    pub num_executing_jobs: usize,
    pub agent_version: String,
}

/// Heartbeat reply; a present `threshold` replaces the admission ceiling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingReply {
    #[serde(default)]
    pub threshold: Option<usize>,
}
