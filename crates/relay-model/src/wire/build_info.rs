use serde::{Deserialize, Serialize};

use crate::domain::Deployment;

/// Reply of `GET /info`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    #[serde(default)]
    pub profiles: ActiveProfiles,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveProfiles {
    #[serde(default)]
    pub active: Vec<String>,
}

impl BuildInfo {
    /// `None` while the server does not advertise any active profile.
    pub fn deployment(&self) -> Option<Deployment> {
        Deployment::from_profiles(&self.profiles.active)
    }
}
