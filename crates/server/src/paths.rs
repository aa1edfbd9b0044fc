//! Central path resolution for all SiteDesk data files.
//!
//! Resolved once at startup from: CLI `--data-dir` > `SITEDESK_DATA_DIR`
//! env > `~/.sitedesk`. All callsites use these helpers instead of
//! constructing paths from `HOME`.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

static DATA_DIR: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Initialize the global data directory. Returns the resolved path.
///
/// Priority: `explicit` arg > `SITEDESK_DATA_DIR` env > `~/.sitedesk`.
pub fn init_data_dir(explicit: Option<&Path>) -> PathBuf {
    let dir = if let Some(p) = explicit {
        p.to_path_buf()
    } else if let Ok(env_val) = std::env::var("SITEDESK_DATA_DIR") {
        PathBuf::from(env_val)
    } else {
        default_data_dir()
    };

    if let Ok(mut guard) = DATA_DIR.write() {
        *guard = Some(dir.clone());
    }
    dir
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".sitedesk")
}

/// The resolved data directory (default if `init_data_dir` was not called).
pub fn data_dir() -> PathBuf {
    if let Ok(guard) = DATA_DIR.read() {
        if let Some(dir) = guard.as_ref() {
            return dir.clone();
        }
    }
    default_data_dir()
}

/// SQLite database path.
pub fn db_path() -> PathBuf {
    data_dir().join("sitedesk.db")
}

/// Directory for server log files.
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}
