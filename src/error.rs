//! Error types for mirror-backup

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for mirroring operations
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("IO error while trying to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Walkdir error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Path mapping error: {} is not under {}", path.display(), root.display())]
    PathMapping { path: PathBuf, root: PathBuf },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backup root {} is locked by another run (remove the lock file if it is stale)", path.display())]
    Locked { path: PathBuf },

    #[error("Source {} and backup {} overlap", source_root.display(), backup_root.display())]
    Overlapping {
        source_root: PathBuf,
        backup_root: PathBuf,
    },
}

/// How a failure affects the rest of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The entry disappeared between enumeration and use; skipped silently.
    NotFound,
    /// The filesystem reported damaged data; the file is skipped.
    Corruption,
    /// Anything else aborts the pass.
    Unexpected,
}

impl MirrorError {
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Path the error refers to, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Io { path, .. } | Self::PathMapping { path, .. } | Self::Locked { path } => {
                Some(path)
            }
            Self::Walk(error) => error.path(),
            _ => None,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Io { source, .. } => classify_io(source),
            Self::Walk(error) => error.io_error().map_or(ErrorClass::Unexpected, classify_io),
            _ => ErrorClass::Unexpected,
        }
    }
}

#[cfg(unix)]
const CORRUPTION_CODES: &[i32] = &[
    5,  // EIO
    22, // EINVAL
];

#[cfg(windows)]
const CORRUPTION_CODES: &[i32] = &[
    23,   // ERROR_CRC
    1392, // ERROR_FILE_CORRUPT
    1393, // ERROR_DISK_CORRUPT
];

#[cfg(not(any(unix, windows)))]
const CORRUPTION_CODES: &[i32] = &[];

/// Classify a raw IO error into the pass-level taxonomy
pub fn classify_io(error: &io::Error) -> ErrorClass {
    if error.kind() == io::ErrorKind::NotFound {
        return ErrorClass::NotFound;
    }
    if error.kind() == io::ErrorKind::InvalidData {
        return ErrorClass::Corruption;
    }
    match error.raw_os_error() {
        Some(code) if CORRUPTION_CODES.contains(&code) => ErrorClass::Corruption,
        _ => ErrorClass::Unexpected,
    }
}

/// Result type alias for mirroring operations
pub type Result<T> = std::result::Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_classified() {
        let error = MirrorError::io(
            "copy",
            "/tmp/missing",
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert_eq!(error.class(), ErrorClass::NotFound);
    }

    #[test]
    fn test_invalid_data_is_corruption() {
        let error = io::Error::new(io::ErrorKind::InvalidData, "bad sector");
        assert_eq!(classify_io(&error), ErrorClass::Corruption);
    }

    #[cfg(unix)]
    #[test]
    fn test_raw_einval_is_corruption() {
        let error = io::Error::from_raw_os_error(22);
        assert_eq!(classify_io(&error), ErrorClass::Corruption);
    }

    #[test]
    fn test_permission_denied_is_unexpected() {
        let error = MirrorError::io(
            "open",
            "/tmp/locked",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert_eq!(error.class(), ErrorClass::Unexpected);
        assert_eq!(error.path(), Some(Path::new("/tmp/locked")));
    }

    #[test]
    fn test_config_error_is_unexpected() {
        let error = MirrorError::Config("no source".to_string());
        assert_eq!(error.class(), ErrorClass::Unexpected);
        assert!(error.path().is_none());
    }
}
