//! Records exchanged with the control server, in their wire shape.
//!
//! Field names follow the server's camelCase JSON (the token endpoint uses snake_case).

pub(crate) mod lenient;

mod job_record;
pub use job_record::{GitResource, JobParameter, JobRecord, TestProject};

mod status_update;
pub use status_update::StatusUpdate;

mod save_log;
pub use save_log::SaveLogRecord;

mod report;
pub use report::ReportRecord;

mod agent_info;
pub use agent_info::{AgentInfo, PingReply};

mod build_info;
pub use build_info::{ActiveProfiles, BuildInfo};

mod token;
pub use token::TokenGrant;

mod release;
pub use release::RunnerRelease;
