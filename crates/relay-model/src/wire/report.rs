use serde::{Deserialize, Serialize};

/// Query record for `junit/test-reports`, registering one uploaded report file.
///
/// Every file of a batch shares the same `batch`; the last one sent carries `is_end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub project_id: String,
    pub batch: String,
    /// Directory of the file relative to the report root, `.` for the root itself.
    pub folder_path: String,
    pub file_name: String,
    pub uploaded_path: String,
    pub is_end: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}
