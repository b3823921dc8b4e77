//! Per-backup-root run lock.
//!
//! Staging names are deterministic per destination, so two passes writing into
//! the same backup root would clobber each other's staged copies. A run
//! therefore holds [`LOCK_FILE_NAME`] in the backup root for its whole
//! duration. The lock file itself is never mirrored or pruned.

use crate::{MirrorError, Result};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const LOCK_FILE_NAME: &str = ".mirror-backup.lock";

/// Whether `path` is the lock file slot directly below `root`
pub fn is_reserved(root: &Path, path: &Path) -> bool {
    path.parent() == Some(root)
        && path
            .file_name()
            .is_some_and(|name| name == LOCK_FILE_NAME)
}

/// Exclusive claim on a backup root, released on drop
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(backup_root: &Path) -> Result<Self> {
        fs::create_dir_all(backup_root)
            .map_err(|e| MirrorError::io("create backup root", backup_root, e))?;

        let path = backup_root.join(LOCK_FILE_NAME);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                return Err(MirrorError::Locked { path });
            }
            Err(error) => return Err(MirrorError::io("create lock file", path, error)),
        };

        // Release the slot if the pid cannot be recorded.
        let lock = Self { path };
        writeln!(file, "{} {}", std::process::id(), Utc::now().to_rfc3339())
            .map_err(|e| MirrorError::io("write lock file", &lock.path, e))?;

        debug!("Acquired run lock {}", lock.path.display());
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
