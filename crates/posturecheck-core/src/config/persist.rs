/// Disk side of the config store: load with quarantine, atomic save.
use super::{AppConfig, ConfigError};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Suffix of the sibling file written before the rename.
pub const TEMP_SUFFIX: &str = "tmp";

/// Suffix of quarantined corrupt files.
pub const BACKUP_SUFFIX: &str = "bak";

/// `<path>.<suffix>` next to the original.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Path of the temporary file used by [`save_atomic`].
pub fn temp_path(path: &Path) -> PathBuf {
    sibling(path, TEMP_SUFFIX)
}

/// `<path>.<unix-millis>.bak`.
pub fn backup_path(path: &Path, now_millis: i64) -> PathBuf {
    sibling(path, &format!("{now_millis}.{BACKUP_SUFFIX}"))
}

/// Read the config at `path`.
///
/// - missing file → defaults
/// - unreadable file → defaults, logged
/// - invalid JSON → the file is copied to a timestamped backup, defaults
pub fn load(path: &Path) -> AppConfig {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("config: {} not found, using defaults", path.display());
            return AppConfig::default();
        }
        Err(e) => {
            warn!("config: cannot read {}: {}", path.display(), e);
            return AppConfig::default();
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(config) => {
            debug!("config: loaded {}", path.display());
            config
        }
        Err(e) => {
            warn!("config: {} is corrupt: {}", path.display(), e);
            quarantine(path);
            AppConfig::default()
        }
    }
}

/// Copy a corrupt config aside. The original is left in place; the next
/// successful save replaces it.
fn quarantine(path: &Path) {
    let backup = backup_path(path, chrono::Utc::now().timestamp_millis());
    match fs::copy(path, &backup) {
        Ok(_) => info!("config: backed up corrupt config to {}", backup.display()),
        Err(e) => warn!("config: failed to back up {}: {}", path.display(), e),
    }
}

/// Write `config` to `path` without ever exposing a half-written file.
///
/// The full document is written and synced to `<path>.tmp`, then renamed
/// over `path`. A crash before the rename leaves the previous file intact.
pub fn save_atomic(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ConfigError::io(path, source)
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let json = serde_json::to_vec_pretty(config)?;
    let tmp = temp_path(path);
    {
        let mut file = fs::File::create(&tmp).map_err(io_err(&tmp))?;
        file.write_all(&json).map_err(io_err(&tmp))?;
        file.sync_all().map_err(io_err(&tmp))?;
    }
    fs::rename(&tmp, path).map_err(io_err(path))?;
    debug!("config: saved {}", path.display());
    Ok(())
}
