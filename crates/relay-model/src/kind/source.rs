use serde::{Deserialize, Serialize};

/// Origin of the project content a job runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProjectSource {
    /// Zip archive served over HTTP.
    Archive { url: String },
    /// Version-control repository cloned at a branch.
    Git(GitRepository),
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRepository {
    pub repository: String,
    pub branch: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository")
            .field("repository", &self.repository)
            .field("branch", &self.branch)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_password() {
        let repo = GitRepository {
            repository: "https://git.example/acme/tests.git".into(),
            branch: Some("origin/main".into()),
            username: Some("ci".into()),
            password: Some("hunter2".into()),
        };
        let printed = format!("{repo:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("***"));
    }
}
