use serde::{Deserialize, Serialize};

/// Pre-signed location a log file is PUT to, plus the server-side path that identifies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDestination {
    pub upload_url: String,
    pub path: String,
}

/// Chains one log upload to the next so the server can follow the continuation of a job log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogUploadState {
    pub destination: UploadDestination,
    pub prior_upload_path: Option<String>,
}

impl LogUploadState {
    pub fn new(destination: UploadDestination) -> Self {
        Self {
            destination,
            prior_upload_path: None,
        }
    }

    /// Moves to a fresh destination, remembering the current path as the prior one.
    pub fn advance(self, destination: UploadDestination) -> Self {
        Self {
            prior_upload_path: Some(self.destination.path),
            destination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest(path: &str) -> UploadDestination {
        UploadDestination {
            upload_url: format!("https://blob.example/{path}?sig=1"),
            path: path.to_string(),
        }
    }

    #[test]
    fn advance_keeps_previous_path() {
        let state = LogUploadState::new(dest("a"));
        assert!(state.prior_upload_path.is_none());

        let state = state.advance(dest("b"));
        assert_eq!(state.prior_upload_path.as_deref(), Some("a"));
        assert_eq!(state.destination.path, "b");

        let state = state.advance(dest("c"));
        assert_eq!(state.prior_upload_path.as_deref(), Some("b"));
    }
}
