use serde::{Deserialize, Serialize};

/// Snapshot of the admission counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentLoad {
    /// Jobs currently holding an admission slot.
    pub in_flight: usize,
    /// Maximum number of concurrently admitted jobs (always >= 1).
    pub ceiling: usize,
}
