//! Sync pass: mirrors new and modified source files into the backup tree.
//!
//! The pass walks the source tree once. Empty directories are recreated,
//! files missing from the backup are copied, and files whose backup copy is
//! older than the source are replaced, always through a [`staged`] write.
//! Every backup-side path the pass vouches for is collected into the
//! [`ExpectedPaths`] set, which is the only input the prune pass trusts.
//!
//! [`staged`]: crate::staged

use crate::exceptions::{ExceptionSet, MatchMode};
use crate::lock::is_reserved;
use crate::log::LogSink;
use crate::paths::TreeMap;
use crate::staged::{is_incomplete_marker, staged_copy};
use crate::{ErrorClass, MirrorError, Result};
use chrono::{DateTime, Utc};
use filetime::FileTime;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, span, Level};
use walkdir::{DirEntry, WalkDir};

/// Backup-side files and empty directories that must exist after a pass
pub type ExpectedPaths = BTreeSet<PathBuf>;

/// Copies one source file onto its backup path
pub(crate) type CopyFn = fn(&Path, &Path) -> Result<u64>;

/// Options for the sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Descend into symlinked directories of the source tree
    pub follow_symlinks: bool,
    /// Delete `.incomplete` leftovers in the backup tree before copying
    pub sweep_incomplete: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            sweep_incomplete: true,
        }
    }
}

/// Outcome of a sync pass
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Number of expected paths (files and empty directories)
    pub processed: usize,
    /// Files copied because the backup had no copy
    pub copied: usize,
    /// Files replaced because the backup copy was older
    pub updated: usize,
    /// Empty directories created in the backup
    pub dirs_created: usize,
    /// Files skipped after a corruption error
    pub corrupted: usize,
    /// Leftover `.incomplete` files removed before the walk
    pub markers_removed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip)]
    pub expected: ExpectedPaths,
}

impl SyncReport {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            processed: 0,
            copied: 0,
            updated: 0,
            dirs_created: 0,
            corrupted: 0,
            markers_removed: 0,
            started_at: now,
            finished_at: now,
            expected: ExpectedPaths::new(),
        }
    }

    /// Paths actually written by this pass
    pub fn backed_up(&self) -> usize {
        self.copied + self.updated + self.dirs_created
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Copied,
    Updated,
    Unchanged,
}

/// Sync engine for one source/backup pair
pub struct SyncEngine<'a> {
    map: TreeMap,
    exceptions: ExceptionSet,
    options: SyncOptions,
    sink: &'a dyn LogSink,
    copy: CopyFn,
}

impl<'a> SyncEngine<'a> {
    pub fn new(map: TreeMap, exceptions: ExceptionSet, sink: &'a dyn LogSink) -> Self {
        Self {
            map,
            exceptions,
            options: SyncOptions::default(),
            sink,
            copy: staged_copy,
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_copy(mut self, copy: CopyFn) -> Self {
        self.copy = copy;
        self
    }

    /// Run the pass and return the expected path set with counters
    pub fn run(&self) -> Result<SyncReport> {
        let span = span!(
            Level::INFO,
            "sync",
            source = %self.map.source_root().display(),
            backup = %self.map.backup_root().display()
        );
        let _enter = span.enter();

        let mut report = SyncReport::new();

        self.sink.warning(&format!(
            "Excepted paths -> {}",
            self.exceptions.fragments().join("; ")
        ));

        let backup_root = self.map.backup_root();
        fs::create_dir_all(backup_root)
            .map_err(|e| self.unexpected(MirrorError::io("create backup root", backup_root, e)))?;

        if self.options.sweep_incomplete {
            report.markers_removed = self.sweep_markers()?;
        }

        let source_root = self.map.source_root();
        let walker = WalkDir::new(source_root)
            .follow_links(self.options.follow_symlinks)
            .into_iter()
            .filter_entry(|entry| self.is_source_included(source_root, entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    let error = MirrorError::from(error);
                    if error.class() == ErrorClass::NotFound {
                        debug!("Entry vanished during walk: {}", error);
                        continue;
                    }
                    return Err(self.unexpected(error));
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                self.sync_directory(entry.path(), &mut report)?;
            } else if file_type.is_file() {
                self.sync_file(entry.path(), &mut report)?;
            } else if file_type.is_symlink() {
                match fs::metadata(entry.path()) {
                    Ok(target) if target.is_file() => self.sync_file(entry.path(), &mut report)?,
                    Ok(_) => debug!("Skipping symlinked directory {}", entry.path().display()),
                    Err(error) if error.kind() == io::ErrorKind::NotFound => {
                        debug!("Skipping dangling symlink {}", entry.path().display());
                    }
                    Err(error) => {
                        return Err(self.unexpected(MirrorError::io(
                            "resolve symlink",
                            entry.path(),
                            error,
                        )))
                    }
                }
            } else {
                debug!("Skipping special file {}", entry.path().display());
            }
        }

        report.processed = report.expected.len();
        report.finished_at = Utc::now();

        self.sink
            .info(&format!("{} paths are processed", report.processed));
        self.sink
            .info(&format!("{} paths are backed up", report.backed_up()));
        if report.corrupted > 0 {
            self.sink.warning(&format!(
                "{} corrupted files were skipped",
                report.corrupted
            ));
        }

        Ok(report)
    }

    /// The backup slot of a source-root file named like the run lock is held
    /// by the lock itself, so that file is skipped with a warning.
    fn is_source_included(&self, root: &Path, entry: &DirEntry) -> bool {
        if entry.depth() == 1 && is_reserved(root, entry.path()) {
            self.sink.warning(&format!(
                "\"{}\" has the name of the run lock file and is not backed up",
                entry.path().display()
            ));
            return false;
        }
        self.is_included(root, entry)
    }

    fn is_included(&self, root: &Path, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return true;
        }
        if self.exceptions.is_excepted(root, entry.path()) {
            debug!("Excepted: {}", entry.path().display());
            return false;
        }
        true
    }

    fn sync_directory(&self, dir: &Path, report: &mut SyncReport) -> Result<()> {
        match is_empty_dir(dir) {
            Ok(false) => Ok(()),
            Ok(true) => {
                let backup_dir = self.map.to_backup(dir)?;
                report.expected.insert(backup_dir.clone());
                if !backup_dir.is_dir() {
                    fs::create_dir_all(&backup_dir).map_err(|e| {
                        self.unexpected(MirrorError::io("create directory", &backup_dir, e))
                    })?;
                    self.sink
                        .info(&format!("Folder \"{}\" is created", backup_dir.display()));
                    report.dirs_created += 1;
                }
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(self.unexpected(MirrorError::io("list", dir, error))),
        }
    }

    fn sync_file(&self, file: &Path, report: &mut SyncReport) -> Result<()> {
        let backup_file = self.map.to_backup(file)?;
        report.expected.insert(backup_file.clone());

        match self.copy_if_newer(file, &backup_file) {
            Ok(FileOutcome::Copied) => {
                self.sink.info(&format!(
                    "Copied \"{}\" to \"{}\"",
                    file.display(),
                    backup_file.display()
                ));
                report.copied += 1;
            }
            Ok(FileOutcome::Updated) => {
                self.sink
                    .info(&format!("File \"{}\" is updated", backup_file.display()));
                report.updated += 1;
            }
            Ok(FileOutcome::Unchanged) => {}
            Err(error) => match error.class() {
                ErrorClass::NotFound => debug!("Source vanished: {}", file.display()),
                ErrorClass::Corruption => {
                    self.sink
                        .critical(&format!("File \"{}\" is corrupted: {}", file.display(), error));
                    report.corrupted += 1;
                }
                ErrorClass::Unexpected => return Err(self.unexpected(error)),
            },
        }

        Ok(())
    }

    fn copy_if_newer(&self, source: &Path, backup: &Path) -> Result<FileOutcome> {
        match fs::metadata(backup) {
            Ok(backup_meta) => {
                let source_meta =
                    fs::metadata(source).map_err(|e| MirrorError::io("read metadata of", source, e))?;
                let source_mtime = FileTime::from_last_modification_time(&source_meta);
                let backup_mtime = FileTime::from_last_modification_time(&backup_meta);

                if backup_mtime < source_mtime {
                    (self.copy)(source, backup)?;
                    Ok(FileOutcome::Updated)
                } else {
                    Ok(FileOutcome::Unchanged)
                }
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                if let Some(parent) = backup.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| MirrorError::io("create directory", parent, e))?;
                }
                (self.copy)(source, backup)?;
                Ok(FileOutcome::Copied)
            }
            Err(error) => Err(MirrorError::io("read metadata of", backup, error)),
        }
    }

    /// Remove `.incomplete` files left in the backup tree by an interrupted run.
    ///
    /// A marker-named file is kept when the source holds a real file of the
    /// same name, since it is then an ordinary mirrored file.
    fn sweep_markers(&self) -> Result<usize> {
        let backup_root = self.map.backup_root();
        let mut removed = 0;

        let walker = WalkDir::new(backup_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| self.is_included(backup_root, entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    let error = MirrorError::from(error);
                    if error.class() == ErrorClass::NotFound {
                        continue;
                    }
                    return Err(self.unexpected(error));
                }
            };

            if entry.file_type().is_dir() || !is_incomplete_marker(entry.path()) {
                continue;
            }

            let source = self.map.to_source(entry.path())?;
            if source.is_file() {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    self.sink.warning(&format!(
                        "Removed leftover incomplete file \"{}\"",
                        entry.path().display()
                    ));
                    removed += 1;
                }
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => {
                    return Err(self.unexpected(MirrorError::io(
                        "remove incomplete file",
                        entry.path(),
                        error,
                    )))
                }
            }
        }

        Ok(removed)
    }

    fn unexpected(&self, error: MirrorError) -> MirrorError {
        self.sink.error(&format!("{} in the sync pass", error));
        error
    }
}

pub(crate) fn is_empty_dir(dir: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(dir)?.next().is_none())
}

/// Mirror `source_root` into `backup_root` using the platform exceptions plus
/// `extra_exceptions`.
pub fn sync(
    source_root: &Path,
    backup_root: &Path,
    extra_exceptions: Option<&[String]>,
    sink: &dyn LogSink,
) -> Result<SyncReport> {
    let exceptions =
        ExceptionSet::with_user_fragments(MatchMode::Component, extra_exceptions.unwrap_or(&[]))
            .anchored_at(source_root);
    SyncEngine::new(TreeMap::new(source_root, backup_root), exceptions, sink).run()
}
