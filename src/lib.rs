//! # mirror-backup
//!
//! One-way incremental mirroring of a directory tree into a backup tree.
//!
//! ## Features
//!
//! - **Sync pass**: copies new files, refreshes files whose backup copy is
//!   older than the source, and recreates empty directories
//! - **Staged writes**: every copy lands under a `.incomplete` name first and is
//!   renamed over the destination only once complete
//! - **Prune pass**: optional cleanup that re-copies size-mismatched files and
//!   deletes backup entries the sync pass did not vouch for
//! - **Exceptions**: platform trash folders are skipped, plus any fragments
//!   the caller adds
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! # fn main() -> mirror_backup::Result<()> {
//! let excepted = vec!["node_modules".to_string()];
//! let summary = mirror_backup::backup(
//!     Path::new("/home/me/Documents"),
//!     Path::new("/mnt/usb/Documents"),
//!     Some(excepted.as_slice()),
//!     true,
//! )?;
//! println!("{} paths backed up", summary.sync.backed_up());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod exceptions;
pub mod job;
pub mod lock;
pub mod log;
pub mod paths;
pub mod prune;
pub mod staged;
pub mod sync;

// Re-export commonly used types
pub use config::MirrorConfig;
pub use error::{ErrorClass, MirrorError, Result};
pub use exceptions::{ExceptionSet, MatchMode};
pub use job::{backup, run_job, BackupSummary, MirrorJob};
pub use log::{LogSink, MemorySink, Severity, TracingSink};
pub use paths::TreeMap;
pub use prune::{prune, PruneEngine, PruneReport};
pub use sync::{sync, ExpectedPaths, SyncEngine, SyncOptions, SyncReport};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
