use std::{path::PathBuf, time::Duration};

/// Timing and filesystem settings of the scheduler loop.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between acquisition ticks.
    pub acquire_interval: Duration,
    /// Interval between heartbeats.
    pub heartbeat_interval: Duration,
    /// Minimum spacing between streamed log uploads.
    pub throttle_window: Duration,
    /// Lead time before token expiry at which renewal starts.
    pub renewal_margin: Duration,
    /// Parent directory of job working areas.
    pub work_root: PathBuf,
}

impl SchedulerConfig {
    /// Environment variable switching to the short debug intervals when set to `debug`.
    pub const ENV: &'static str = "RELAY_ENV";

    pub fn new(debug: bool, work_root: impl Into<PathBuf>) -> Self {
        let acquire_interval = if debug {
            Duration::from_secs(5)
        } else {
            Duration::from_secs(60)
        };
        let heartbeat_interval = if debug {
            Duration::from_secs(30)
        } else {
            Duration::from_secs(60)
        };
        Self {
            acquire_interval,
            heartbeat_interval,
            throttle_window: Duration::from_secs(10),
            renewal_margin: acquire_interval * 3,
            work_root: work_root.into(),
        }
    }

    pub fn from_env(work_root: impl Into<PathBuf>) -> Self {
        let debug = std::env::var(Self::ENV).is_ok_and(|v| v == "debug");
        Self::new(debug, work_root)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(false, "tmp")
    }
}
