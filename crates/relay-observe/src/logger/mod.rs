mod config;
mod error;
mod format;
mod level;
mod log;

pub use config::LoggerConfig;
pub use error::LoggerError;
pub use format::LoggerFormat;
pub use level::{LevelHandle, normalize_level};

/// Installs the global subscriber and returns the handle that changes its level at runtime.
pub fn logger_init(cfg: &LoggerConfig) -> Result<LevelHandle, LoggerError> {
    match cfg.format {
        LoggerFormat::Text => log::Logger::text(cfg),
        LoggerFormat::Json => log::Logger::json(cfg),
        LoggerFormat::Journald => log::Logger::journald(cfg),
    }
}
