//! Single-writer guard for one data directory.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use nd_core::{Error, Result};
use tracing::{debug, warn};

pub const LOCK_FILE: &str = ".curation.lock";

/// Held for the duration of one run. The lock file records the holder's pid
/// and start time and is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Takes the lock for `data_dir`, failing with [`Error::Locked`] if another
    /// run holds it.
    pub fn acquire(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(LOCK_FILE);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(&path)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(Error::Locked {
                    path: path.display().to_string(),
                    holder,
                });
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "pid={} started={}", std::process::id(), Utc::now().to_rfc3339())?;
        file.sync_all()?;
        debug!(path = %path.display(), "run lock acquired");
        Ok(Self { path })
    }

    /// Removes a lock left behind by a crashed run. Returns whether one existed.
    pub fn force_release(data_dir: impl AsRef<Path>) -> Result<bool> {
        let path = data_dir.as_ref().join(LOCK_FILE);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                warn!(path = %path.display(), "stale run lock removed");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove run lock");
        }
    }
}
