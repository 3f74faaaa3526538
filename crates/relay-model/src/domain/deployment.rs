use serde::{Deserialize, Serialize};

/// Deployment profile of the control server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Deployment {
    OnPremise,
    Cloud,
}

impl Deployment {
    /// Resolves the profile from the server's active profile list.
    ///
    /// An empty list is not an answer; the caller asks again later.
    pub fn from_profiles<S: AsRef<str>>(profiles: &[S]) -> Option<Self> {
        if profiles.is_empty() {
            return None;
        }
        if profiles.iter().any(|p| p.as_ref() == "on-premise") {
            Some(Deployment::OnPremise)
        } else {
            Some(Deployment::Cloud)
        }
    }

    pub fn is_on_premise(&self) -> bool {
        matches!(self, Deployment::OnPremise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_profiles() {
        assert_eq!(
            Deployment::from_profiles(&["prod", "on-premise"]),
            Some(Deployment::OnPremise)
        );
        assert_eq!(Deployment::from_profiles(&["prod"]), Some(Deployment::Cloud));
        assert_eq!(Deployment::from_profiles::<&str>(&[]), None);
    }
}
