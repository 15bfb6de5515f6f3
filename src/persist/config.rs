use crate::core::{Result, StoreError};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_STORAGE_PATH: &str = "storage.json";

/// Quiescence interval used when none is configured.
pub const DEFAULT_QUIESCENCE: Duration = Duration::from_millis(1);

pub const STORAGE_PATH_ENV: &str = "CHATLINK_STORAGE_PATH";
pub const QUIESCENCE_ENV: &str = "CHATLINK_QUIESCENCE_MS";

/// Where and how often a persistent root is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOptions {
    /// Snapshot file, rewritten in full on each flush
    pub path: PathBuf,

    /// Idle time after the last mutation before a write fires
    pub quiescence: Duration,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self::new(DEFAULT_STORAGE_PATH)
    }
}

impl PersistOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            quiescence: DEFAULT_QUIESCENCE,
        }
    }

    /// Set the snapshot path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the quiescence interval
    pub fn quiescence(mut self, quiescence: Duration) -> Self {
        self.quiescence = quiescence;
        self
    }

    /// Reads `CHATLINK_STORAGE_PATH` and `CHATLINK_QUIESCENCE_MS`, falling
    /// back to the defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        let mut options = Self::default();
        if let Ok(path) = std::env::var(STORAGE_PATH_ENV) {
            options.path = PathBuf::from(path);
        }
        if let Ok(raw) = std::env::var(QUIESCENCE_ENV) {
            options.quiescence = parse_quiescence_ms(&raw)?;
        }
        Ok(options)
    }
}

fn parse_quiescence_ms(raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| {
            StoreError::Validation(format!(
                "{} must be a number of milliseconds, got '{}'",
                QUIESCENCE_ENV, raw
            ))
        })
}
