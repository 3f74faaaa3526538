use std::sync::{Mutex, PoisonError};

use tracing_subscriber::{EnvFilter, Registry, reload};

use crate::logger::error::LoggerError;

/// Maps log4j-style level names onto tracing levels; directives pass through unchanged.
pub fn normalize_level(level: &str) -> String {
    let trimmed = level.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "all" => "trace".to_string(),
        "fatal" | "mark" => "error".to_string(),
        "trace" | "debug" | "info" | "warn" | "error" | "off" => trimmed.to_ascii_lowercase(),
        _ => trimmed.to_string(),
    }
}

pub(crate) fn mk_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    let level = normalize_level(level);
    EnvFilter::try_new(&level).map_err(|_| LoggerError::InvalidLogLevel(level))
}

pub(crate) type FilterLayer = reload::Layer<EnvFilter, Registry>;

/// Changes the level of an installed subscriber.
pub struct LevelHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    current: Mutex<String>,
}

impl LevelHandle {
    pub(crate) fn layer(level: &str) -> Result<(FilterLayer, Self), LoggerError> {
        let (layer, handle) = reload::Layer::new(mk_filter(level)?);
        Ok((
            layer,
            Self {
                handle,
                current: Mutex::new(normalize_level(level)),
            },
        ))
    }

    pub fn current(&self) -> String {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies `level` if it differs from the active one. Returns `true` when it changed.
    pub fn set_level(&self, level: &str) -> Result<bool, LoggerError> {
        let next = normalize_level(level);
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if next.is_empty() || *current == next {
            return Ok(false);
        }
        let filter = mk_filter(&next)?;
        self.handle
            .reload(filter)
            .map_err(|e| LoggerError::Reload(e.to_string()))?;
        *current = next;
        Ok(true)
    }
}
