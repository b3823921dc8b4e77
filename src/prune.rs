//! Cleanup pass: repairs size mismatches and removes backup entries that the
//! sync pass did not vouch for.
//!
//! The pass never decides on its own what should exist. Everything it sees in
//! the backup tree is compared against the [`ExpectedPaths`] produced by the
//! sync pass, and only the difference is deleted.

use crate::exceptions::ExceptionSet;
use crate::lock::is_reserved;
use crate::log::LogSink;
use crate::paths::TreeMap;
use crate::staged::staged_copy;
use crate::sync::{is_empty_dir, CopyFn, ExpectedPaths};
use crate::{ErrorClass, MirrorError, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, span, Level};
use walkdir::{DirEntry, WalkDir};

/// Outcome of a prune pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Backup files re-copied because their size differed from the source
    pub recopied: usize,
    /// Unexpected paths deleted, individually or as part of a removed tree
    pub removed: usize,
    /// Containing directories deleted because their source directory is gone
    pub trees_removed: usize,
}

impl PruneReport {
    pub fn total_removed(&self) -> usize {
        self.removed + self.trees_removed
    }
}

/// Paths observed while walking the backup tree
#[derive(Debug, Default)]
struct BackupInventory {
    empty_dirs: BTreeSet<PathBuf>,
    files: BTreeSet<PathBuf>,
}

pub struct PruneEngine<'a> {
    map: TreeMap,
    exceptions: ExceptionSet,
    sink: &'a dyn LogSink,
    copy: CopyFn,
}

impl<'a> PruneEngine<'a> {
    pub fn new(map: TreeMap, exceptions: ExceptionSet, sink: &'a dyn LogSink) -> Self {
        Self {
            map,
            exceptions,
            sink,
            copy: staged_copy,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_copy(mut self, copy: CopyFn) -> Self {
        self.copy = copy;
        self
    }

    pub fn run(&self, expected: &ExpectedPaths) -> Result<PruneReport> {
        let span = span!(
            Level::INFO,
            "prune",
            backup = %self.map.backup_root().display(),
            expected = expected.len()
        );
        let _enter = span.enter();

        let mut report = PruneReport::default();
        let inventory = self.inventory(&mut report)?;

        let unnecessary: BTreeSet<&PathBuf> = inventory
            .empty_dirs
            .iter()
            .chain(inventory.files.iter())
            .filter(|path| !expected.contains(*path))
            .collect();

        self.remove_unnecessary(unnecessary, expected, &mut report)?;

        self.sink
            .info(&format!("{} paths are removed", report.total_removed()));
        Ok(report)
    }

    /// Walk the backup tree, re-copying files whose size disagrees with the source
    fn inventory(&self, report: &mut PruneReport) -> Result<BackupInventory> {
        let backup_root = self.map.backup_root();
        let mut inventory = BackupInventory::default();

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

            if entry.file_type().is_dir() {
                if entry.depth() == 0 {
                    continue;
                }
                match is_empty_dir(entry.path()) {
                    Ok(true) => {
                        inventory.empty_dirs.insert(entry.path().to_path_buf());
                    }
                    Ok(false) => {}
                    Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                    Err(error) => {
                        return Err(self.unexpected(MirrorError::io("list", entry.path(), error)))
                    }
                }
                continue;
            }

            inventory.files.insert(entry.path().to_path_buf());

            match self.repair_size_mismatch(&entry) {
                Ok(true) => report.recopied += 1,
                Ok(false) => {}
                Err(error) => match error.class() {
                    ErrorClass::NotFound => {}
                    ErrorClass::Corruption => self.sink.critical(&format!(
                        "File \"{}\" is corrupted: {}",
                        entry.path().display(),
                        error
                    )),
                    ErrorClass::Unexpected => return Err(self.unexpected(error)),
                },
            }
        }

        Ok(inventory)
    }

    fn is_included(&self, root: &Path, entry: &DirEntry) -> bool {
        entry.depth() == 0
            || !(is_reserved(root, entry.path()) || self.exceptions.is_excepted(root, entry.path()))
    }

    /// Re-copy a backup file whose byte size differs from its source.
    ///
    /// Returns `Ok(false)` when the source is gone or is not a regular file;
    /// the deletion phase takes care of those.
    fn repair_size_mismatch(&self, entry: &DirEntry) -> Result<bool> {
        let backup_file = entry.path();
        let source_file = self.map.to_source(backup_file)?;

        let source_meta = match fs::metadata(&source_file) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(false),
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(error) => return Err(MirrorError::io("read metadata of", source_file, error)),
        };
        let backup_meta = entry.metadata()?;

        if source_meta.len() == backup_meta.len() {
            return Ok(false);
        }

        debug!(
            "Size mismatch for {}: source {} bytes, backup {} bytes",
            backup_file.display(),
            source_meta.len(),
            backup_meta.len()
        );
        (self.copy)(&source_file, backup_file)?;
        self.sink.info(&format!(
            "Replaced \"{}\" by \"{}\"",
            backup_file.display(),
            source_file.display()
        ));
        Ok(true)
    }

    fn remove_unnecessary(
        &self,
        unnecessary: BTreeSet<&PathBuf>,
        expected: &ExpectedPaths,
        report: &mut PruneReport,
    ) -> Result<()> {
        let backup_root = self.map.backup_root();
        let mut removed_trees: Vec<PathBuf> = Vec::new();

        for path in unnecessary {
            self.sink.info(&format!(
                "\"{}\" path will be removed from backup",
                path.display()
            ));

            if removed_trees.iter().any(|tree| path.starts_with(tree)) {
                report.removed += 1;
                continue;
            }

            let metadata = match fs::symlink_metadata(path) {
                Ok(metadata) => metadata,
                Err(error) if error.kind() == io::ErrorKind::NotFound => continue,
                Err(error) => {
                    return Err(self.unexpected(MirrorError::io("inspect", path.as_path(), error)))
                }
            };

            let orphaned_container = match path.parent() {
                Some(dir) if dir != backup_root && !contains_expected(expected, dir) => {
                    let source_dir = self.map.to_source(dir)?;
                    let exists = source_dir
                        .try_exists()
                        .map_err(|e| self.unexpected(MirrorError::io("inspect", &source_dir, e)))?;
                    if exists || self.holds_excepted(dir)? {
                        None
                    } else {
                        Some(dir)
                    }
                }
                _ => None,
            };

            if let Some(dir) = orphaned_container {
                fs::remove_dir_all(dir)
                    .map_err(|e| self.unexpected(MirrorError::io("remove", dir, e)))?;
                self.sink
                    .info(&format!("\"{}\" path is removed from backup", dir.display()));
                removed_trees.push(dir.to_path_buf());
                report.removed += 1;
                report.trees_removed += 1;
            } else {
                let result = if metadata.is_dir() {
                    fs::remove_dir_all(path)
                } else {
                    fs::remove_file(path)
                };
                match result {
                    Ok(()) => report.removed += 1,
                    Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                    Err(error) => {
                        return Err(self.unexpected(MirrorError::io(
                            "remove",
                            path.as_path(),
                            error,
                        )))
                    }
                }
            }
        }

        Ok(())
    }

    /// Whether `dir` holds an entry the inventory walk skipped as excepted.
    ///
    /// Such a directory is never removed as a whole; only its unexpected
    /// entries go.
    fn holds_excepted(&self, dir: &Path) -> Result<bool> {
        let backup_root = self.map.backup_root();

        for entry in WalkDir::new(dir).min_depth(1).follow_links(false) {
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
            if self.exceptions.is_excepted(backup_root, entry.path()) {
                debug!(
                    "Keeping {} for excepted entry {}",
                    dir.display(),
                    entry.path().display()
                );
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn unexpected(&self, error: MirrorError) -> MirrorError {
        self.sink.error(&format!("{} in the prune pass", error));
        error
    }
}

/// Whether any expected path lies at or below `dir`.
///
/// Paths sharing a component prefix are contiguous in a `BTreeSet<PathBuf>`,
/// so the first entry at or after `dir` decides.
fn contains_expected(expected: &ExpectedPaths, dir: &Path) -> bool {
    expected
        .range(dir.to_path_buf()..)
        .next()
        .is_some_and(|first| first.starts_with(dir))
}

/// Remove backup entries absent from `expected`, using only the platform
/// exceptions for the walk.
pub fn prune(
    source_root: &Path,
    backup_root: &Path,
    expected: &ExpectedPaths,
    system_exceptions: &ExceptionSet,
    sink: &dyn LogSink,
) -> Result<PruneReport> {
    PruneEngine::new(
        TreeMap::new(source_root, backup_root),
        system_exceptions.clone(),
        sink,
    )
    .run(expected)
}
