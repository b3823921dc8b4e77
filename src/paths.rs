//! Mapping between the source tree and its mirror.

use crate::{MirrorError, Result};
use std::path::{Path, PathBuf};

/// A pair of tree roots; converts paths from one tree into the other by
/// stripping one root and joining the remainder onto the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeMap {
    source_root: PathBuf,
    backup_root: PathBuf,
}

impl TreeMap {
    pub fn new(source_root: impl Into<PathBuf>, backup_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            backup_root: backup_root.into(),
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Backup-side counterpart of a source path
    pub fn to_backup(&self, source_path: &Path) -> Result<PathBuf> {
        rebase(source_path, &self.source_root, &self.backup_root)
    }

    /// Source-side counterpart of a backup path
    pub fn to_source(&self, backup_path: &Path) -> Result<PathBuf> {
        rebase(backup_path, &self.backup_root, &self.source_root)
    }
}

fn rebase(path: &Path, from: &Path, to: &Path) -> Result<PathBuf> {
    let relative = path
        .strip_prefix(from)
        .map_err(|_| MirrorError::PathMapping {
            path: path.to_path_buf(),
            root: from.to_path_buf(),
        })?;

    if relative.as_os_str().is_empty() {
        Ok(to.to_path_buf())
    } else {
        Ok(to.join(relative))
    }
}
