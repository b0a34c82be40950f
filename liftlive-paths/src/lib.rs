//! Cross-platform path utilities for LiftLive.
//!
//! Single source of truth for where the daemon keeps its configuration
//! file and its set-history database.
//!
//! # Platform Behavior
//!
//! | Platform | Data Directory | Config Directory |
//! |----------|----------------|------------------|
//! | Linux    | `~/.local/share/liftlive` | `~/.config/liftlive` |
//! | macOS    | `~/Library/Application Support/liftlive` | Same as data dir |
//! | Windows  | `%APPDATA%/liftlive` | Same as data dir |

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

/// Errors specific to path operations.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not determine home directory")]
    NoHomeDirectory,

    #[error("Could not determine data directory")]
    NoDataDirectory,

    #[error("Could not determine config directory")]
    NoConfigDirectory,
}

/// Application identifier used in path construction.
const APP_NAME: &str = "liftlive";

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Set-history database file name.
const HISTORY_DB_NAME: &str = "history.db";

/// Create `dir` if missing, owner-only on Unix.
fn ensure_private_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o700);
        fs::set_permissions(dir, perms)
            .with_context(|| format!("Failed to set permissions on {}", dir.display()))?;
    }

    Ok(())
}

/// Get the application data directory, creating it if needed.
///
/// # Errors
/// Returns an error if the directory cannot be determined or created.
pub fn get_data_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().ok_or(PathError::NoDataDirectory)?;
    let data_dir = base_dir.join(APP_NAME);
    ensure_private_dir(&data_dir)?;
    Ok(data_dir)
}

/// Get the configuration directory, creating it if needed.
///
/// Linux follows XDG (`~/.config/liftlive`); other platforms keep
/// configuration next to the data.
pub fn get_config_dir() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let config_base = dirs::config_dir().ok_or(PathError::NoConfigDirectory)?;
        let config_dir = config_base.join(APP_NAME);
        ensure_private_dir(&config_dir)?;
        Ok(config_dir)
    }

    #[cfg(not(target_os = "linux"))]
    {
        get_data_dir()
    }
}

/// Get the database directory (`<data_dir>/db`).
pub fn get_db_dir() -> Result<PathBuf> {
    let db_dir = get_data_dir()?.join("db");
    ensure_private_dir(&db_dir)?;
    Ok(db_dir)
}

/// Path of the daemon configuration file.
pub fn get_config_file_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Path of the set-history SQLite database.
pub fn get_history_db_path() -> Result<PathBuf> {
    Ok(get_db_dir()?.join(HISTORY_DB_NAME))
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir().ok_or(PathError::NoHomeDirectory)?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}
