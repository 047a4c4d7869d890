/// Persistent application state: a small JSON file owned by one
/// [`ConfigStore`].
///
/// # File format
///
/// ```text
/// { "keepInBackground": false, "lastReportDate": "2026-03-01T12:00:00Z" }
/// ```
///
/// # Guarantees
///
/// - Reads never fail: a missing file yields defaults, a corrupt file is
///   copied aside to `<file>.<unix-millis>.bak` and defaults are used.
/// - Writes are atomic: the full state goes to `<file>.tmp`, which is then
///   renamed over the real file.
/// - Rapid updates are coalesced into one write after [`DEFAULT_SAVE_DELAY`].
pub mod persist;
pub mod reminder;
pub mod store;

pub use reminder::{is_report_due, REMINDER_CHECK_INTERVAL, REMINDER_MESSAGE};
pub use store::{ConfigStore, SaveHandle};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Debounce window between the last update and the disk write.
pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_secs(1);

/// File name inside the application data directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Directory name under the platform local-data directory.
pub const APP_DIR_NAME: &str = "posturecheck";

/// Persisted application state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Keep the process alive in the background after the window closes.
    pub keep_in_background: bool,
    /// When the last security report was produced, if ever.
    pub last_report_date: Option<DateTime<Utc>>,
}

/// Partial update merged into [`AppConfig`]. `None` fields are left alone.
///
/// `last_report_date` is doubly optional so a patch can clear the date
/// (`Some(None)`) as well as set it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigPatch {
    pub keep_in_background: Option<bool>,
    pub last_report_date: Option<Option<DateTime<Utc>>>,
}

impl ConfigPatch {
    pub fn keep_in_background(value: bool) -> Self {
        Self {
            keep_in_background: Some(value),
            ..Self::default()
        }
    }

    pub fn last_report_date(value: DateTime<Utc>) -> Self {
        Self {
            last_report_date: Some(Some(value)),
            ..Self::default()
        }
    }

    /// Fold a later patch into this one; the later value wins per field.
    pub fn merge(&mut self, later: ConfigPatch) {
        if later.keep_in_background.is_some() {
            self.keep_in_background = later.keep_in_background;
        }
        if later.last_report_date.is_some() {
            self.last_report_date = later.last_report_date;
        }
    }
}

impl AppConfig {
    /// Apply a patch in place.
    pub fn apply(&mut self, patch: &ConfigPatch) {
        if let Some(keep) = patch.keep_in_background {
            self.keep_in_background = keep;
        }
        if let Some(date) = patch.last_report_date {
            self.last_report_date = date;
        }
    }
}

/// Failure to persist the configuration.
///
/// Cloneable so one coalesced save can report the same outcome to every
/// update it covers.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("config I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },
    #[error("failed to serialise config: {0}")]
    Serialize(#[source] Arc<serde_json::Error>),
    #[error("failed to start config save worker: {0}")]
    WorkerSpawn(#[source] Arc<std::io::Error>),
    /// The save worker stopped before reporting a result.
    #[error("config save worker is no longer running")]
    WorkerGone,
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialize(Arc::new(e))
    }
}

/// Tunables for a [`ConfigStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub save_delay: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            save_delay: DEFAULT_SAVE_DELAY,
        }
    }
}

/// `<local data dir>/posturecheck/config.json`, or `None` when the platform
/// has no such directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}
