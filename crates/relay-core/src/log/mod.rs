//! Job log sink and its transport to the blob store.

mod sink;
pub use sink::JobLog;

mod throttle;
pub use throttle::Throttle;

mod streamer;
pub use streamer::{LogStreamer, UploadObserver};

mod upload;
pub use upload::LogUploader;

mod report;
pub use report::ReportUploader;
