//! Command-line interface for mirror-backup.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod backup;
pub mod config;

/// mirror-backup - incremental one-way directory mirroring
#[derive(Parser, Debug)]
#[command(name = "mirror-backup")]
#[command(about = "Mirror a directory tree into a backup tree, optionally pruning stale entries")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Append log lines to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mirror the source into the backup (and optionally prune it)
    Backup(backup::BackupArgs),
    /// Inspect or create the configuration file
    Config(config::ConfigArgs),
}
