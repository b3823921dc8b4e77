//! Crash-tolerant staged writes.
//!
//! A file is first copied next to its destination under the
//! [`INCOMPLETE_SUFFIX`] name and only renamed into place once the copy has
//! finished. The rename replaces any existing destination in one step, so an
//! interrupted pass leaves either the old copy or the new one, plus at worst a
//! stray `.incomplete` sibling.

use crate::{MirrorError, Result};
use filetime::FileTime;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Suffix carried by a file whose copy has not been finalised
pub const INCOMPLETE_SUFFIX: &str = ".incomplete";

/// Staging path used while `target` is being written
pub fn incomplete_path(target: &Path) -> PathBuf {
    with_suffix(target, INCOMPLETE_SUFFIX)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Staging path for copying `source` onto `target`.
///
/// `<target>.incomplete` unless the source tree holds a real file of that
/// name, in which case the backup file there is a mirror and a numbered
/// `<target>.N.incomplete` is used instead.
fn staging_path_for(source: &Path, target: &Path) -> PathBuf {
    let mut attempt = 0u32;
    loop {
        let suffix = match attempt {
            0 => INCOMPLETE_SUFFIX.to_string(),
            n => format!(".{}{}", n, INCOMPLETE_SUFFIX),
        };
        if !with_suffix(source, &suffix).is_file() {
            return with_suffix(target, &suffix);
        }
        attempt += 1;
    }
}

pub fn is_incomplete_marker(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().ends_with(INCOMPLETE_SUFFIX))
}

/// Copy `source` over `target` through a staging file.
///
/// Returns the number of bytes copied.
pub fn staged_copy(source: &Path, target: &Path) -> Result<u64> {
    let write = StagedWrite::begin(source, target)?;
    let bytes = write.stage_from(source)?;
    write.commit()?;
    Ok(bytes)
}

/// Staging file for a single destination; removed on drop unless committed
#[derive(Debug)]
pub struct StagedWrite {
    target: PathBuf,
    staging: PathBuf,
    committed: bool,
}

impl StagedWrite {
    /// Prepare a staging path next to `target` for a copy of `source`,
    /// clearing any leftover from an interrupted run.
    pub fn begin(source: &Path, target: &Path) -> Result<Self> {
        let staging = staging_path_for(source, target);
        match fs::remove_file(&staging) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => {
                return Err(MirrorError::io(
                    "remove leftover staging file",
                    staging,
                    error,
                ))
            }
        }

        Ok(Self {
            target: target.to_path_buf(),
            staging,
            committed: false,
        })
    }

    pub fn staging_path(&self) -> &Path {
        &self.staging
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Copy the source content and modification time into the staging file
    pub fn stage_from(&self, source: &Path) -> Result<u64> {
        let metadata =
            fs::metadata(source).map_err(|e| MirrorError::io("read metadata of", source, e))?;
        let bytes =
            fs::copy(source, &self.staging).map_err(|e| MirrorError::io("copy", source, e))?;

        let mtime = FileTime::from_last_modification_time(&metadata);
        filetime::set_file_mtime(&self.staging, mtime)
            .map_err(|e| MirrorError::io("set modification time of", &self.staging, e))?;

        Ok(bytes)
    }

    /// Move the staging file over the destination
    pub fn commit(mut self) -> Result<()> {
        fs::rename(&self.staging, &self.target)
            .map_err(|e| MirrorError::io("finalise", &self.target, e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.staging);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_incomplete_path_appends_suffix() {
        let path = incomplete_path(Path::new("/bak/a/report.pdf"));
        assert_eq!(path, PathBuf::from("/bak/a/report.pdf.incomplete"));
        assert!(is_incomplete_marker(&path));
        assert!(!is_incomplete_marker(Path::new("/bak/a/report.pdf")));
    }

    #[test]
    fn test_staged_copy_creates_target_without_leftovers() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.txt");
        let target = dir.path().join("target.txt");
        fs::write(&source, b"hello").unwrap();

        let bytes = staged_copy(&source, &target)?;

        assert_eq!(bytes, 5);
        assert_eq!(fs::read(&target).unwrap(), b"hello");
        assert!(!incomplete_path(&target).exists());
        Ok(())
    }

    #[test]
    fn test_staged_copy_replaces_existing_and_keeps_mtime() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.txt");
        let target = dir.path().join("target.txt");
        fs::write(&source, b"new content").unwrap();
        fs::write(&target, b"old").unwrap();
        let mtime = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&source, mtime).unwrap();

        staged_copy(&source, &target)?;

        let metadata = fs::metadata(&target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new content");
        assert_eq!(FileTime::from_last_modification_time(&metadata), mtime);
        Ok(())
    }

    #[test]
    fn test_leftover_staging_file_is_replaced() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.txt");
        let target = dir.path().join("target.txt");
        fs::write(&source, b"fresh").unwrap();
        fs::write(incomplete_path(&target), b"half written garbage").unwrap();

        staged_copy(&source, &target)?;

        assert_eq!(fs::read(&target).unwrap(), b"fresh");
        assert!(!incomplete_path(&target).exists());
        Ok(())
    }

    #[test]
    fn test_missing_source_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target.txt");
        fs::write(&target, b"previous backup").unwrap();

        let err = staged_copy(&dir.path().join("gone.txt"), &target).unwrap_err();

        assert_eq!(err.class(), crate::ErrorClass::NotFound);
        assert_eq!(fs::read(&target).unwrap(), b"previous backup");
        assert!(!incomplete_path(&target).exists());
    }

    #[test]
    fn test_mirrored_marker_named_sibling_is_left_alone() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        let backup = dir.path().join("bak");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&backup).unwrap();
        fs::write(source.join("foo"), b"new foo").unwrap();
        fs::write(source.join("foo.incomplete"), b"real file").unwrap();
        fs::write(backup.join("foo"), b"old foo").unwrap();
        fs::write(backup.join("foo.incomplete"), b"real file").unwrap();

        let write = StagedWrite::begin(&source.join("foo"), &backup.join("foo"))?;
        assert_eq!(write.staging_path(), backup.join("foo.1.incomplete"));
        drop(write);

        staged_copy(&source.join("foo"), &backup.join("foo"))?;

        assert_eq!(fs::read(backup.join("foo")).unwrap(), b"new foo");
        assert_eq!(fs::read(backup.join("foo.incomplete")).unwrap(), b"real file");
        assert!(!backup.join("foo.1.incomplete").exists());
        Ok(())
    }

    #[test]
    fn test_uncommitted_write_removes_staging_on_drop() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.txt");
        let target = dir.path().join("target.txt");
        fs::write(&source, b"data").unwrap();

        let write = StagedWrite::begin(&source, &target)?;
        write.stage_from(&source)?;
        let staging = write.staging_path().to_path_buf();
        assert!(staging.exists());
        drop(write);

        assert!(!staging.exists());
        assert!(!target.exists());
        Ok(())
    }
}
