//! Entry point tying the two passes together.

use crate::exceptions::{ExceptionSet, MatchMode};
use crate::lock::RunLock;
use crate::log::{LogSink, TracingSink};
use crate::paths::TreeMap;
use crate::prune::{PruneEngine, PruneReport};
use crate::sync::{SyncEngine, SyncOptions, SyncReport};
use crate::{MirrorError, Result};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{span, Level};
use uuid::Uuid;

/// A fully resolved source/backup pair ready to run
#[derive(Debug, Clone)]
pub struct MirrorJob {
    pub map: TreeMap,
    pub exceptions: ExceptionSet,
    pub clean_backup: bool,
    pub options: SyncOptions,
}

impl MirrorJob {
    /// Resolve both roots and build the effective exception set.
    ///
    /// The source must be an existing directory. The backup root may not exist
    /// yet, but must not overlap the source in either direction.
    pub fn resolve(
        source: &Path,
        backup: &Path,
        mode: MatchMode,
        user_exceptions: &[String],
    ) -> Result<Self> {
        let source_root = fs::canonicalize(source).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => MirrorError::Config(format!(
                "Source directory {} does not exist",
                source.display()
            )),
            _ => MirrorError::io("resolve source", source, e),
        })?;
        if !source_root.is_dir() {
            return Err(MirrorError::Config(format!(
                "Source {} is not a directory",
                source.display()
            )));
        }

        let backup_root = normalize_root(backup)
            .map_err(|e| MirrorError::io("resolve backup root", backup, e))?;

        if backup_root.starts_with(&source_root) || source_root.starts_with(&backup_root) {
            return Err(MirrorError::Overlapping {
                source_root,
                backup_root,
            });
        }

        let exceptions =
            ExceptionSet::with_user_fragments(mode, user_exceptions).anchored_at(&source_root);

        Ok(Self {
            map: TreeMap::new(source_root, backup_root),
            exceptions,
            clean_backup: false,
            options: SyncOptions::default(),
        })
    }

    pub fn clean_backup(mut self, clean: bool) -> Self {
        self.clean_backup = clean;
        self
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }
}

/// Absolute form of `path` with every existing ancestor canonicalized, so
/// roots that do not exist yet compare correctly against canonical ones.
fn normalize_root(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();

    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(absolute),
        }
    }

    let mut resolved = fs::canonicalize(existing)?;
    for name in missing.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

/// Combined outcome of one invocation
#[derive(Debug, Clone, Serialize)]
pub struct BackupSummary {
    pub run_id: Uuid,
    pub source: PathBuf,
    pub backup: PathBuf,
    pub sync: SyncReport,
    pub prune: Option<PruneReport>,
}

/// Run the sync pass and, when requested, the prune pass.
///
/// The backup root is locked for the duration of the run.
pub fn run_job(job: &MirrorJob, sink: &dyn LogSink) -> Result<BackupSummary> {
    let run_id = Uuid::new_v4();
    let span = span!(Level::INFO, "backup", run_id = %run_id);
    let _enter = span.enter();

    let _lock = RunLock::acquire(job.map.backup_root()).map_err(|e| {
        sink.error(&e.to_string());
        e
    })?;

    sink.info(&format!(
        "Backing up \"{}\" to \"{}\"",
        job.map.source_root().display(),
        job.map.backup_root().display()
    ));

    let sync = SyncEngine::new(job.map.clone(), job.exceptions.clone(), sink)
        .with_options(job.options)
        .run()?;

    let prune = if job.clean_backup {
        sink.warning("Backup cleaner deletes all inconsistent paths in the backup");
        let report = PruneEngine::new(job.map.clone(), job.exceptions.clone(), sink)
            .run(&sync.expected)?;
        Some(report)
    } else {
        sink.info("Backup cleaner is disabled");
        None
    };

    sink.info("Backup completed");

    Ok(BackupSummary {
        run_id,
        source: job.map.source_root().to_path_buf(),
        backup: job.map.backup_root().to_path_buf(),
        sync,
        prune,
    })
}

/// Back up `source` into `backup`, logging through `tracing`.
///
/// `excepted_paths` adds fragments to the platform's trash exceptions;
/// `clean_backup` enables the prune pass.
pub fn backup(
    source: &Path,
    backup: &Path,
    excepted_paths: Option<&[String]>,
    clean_backup: bool,
) -> Result<BackupSummary> {
    let job = MirrorJob::resolve(
        source,
        backup,
        MatchMode::default(),
        excepted_paths.unwrap_or(&[]),
    )?
    .clean_backup(clean_backup);
    run_job(&job, &TracingSink)
}
