//! Backup command implementation.

use crate::exceptions::MatchMode;
use crate::job::{run_job, BackupSummary};
use crate::log::TracingSink;
use crate::MirrorConfig;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the backup command
#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Source directory to back up (overrides the config file)
    pub source: Option<PathBuf>,

    /// Backup directory (created if missing)
    pub backup: Option<PathBuf>,

    /// Skip paths matching this fragment (repeatable)
    #[arg(short = 'x', long = "except", value_name = "FRAGMENT")]
    pub except: Vec<String>,

    /// Remove backup entries that no longer exist in the source
    #[arg(short, long)]
    pub clean: bool,

    /// How exception fragments are matched
    #[arg(long, value_enum)]
    pub match_mode: Option<MatchMode>,

    /// Descend into symlinked directories
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Keep `.incomplete` leftovers from interrupted runs
    #[arg(long)]
    pub no_sweep_incomplete: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl BackupArgs {
    /// Layer command-line values over the loaded configuration
    pub fn apply(&self, config: &mut MirrorConfig) {
        if let Some(source) = &self.source {
            config.source = Some(source.clone());
        }
        if let Some(backup) = &self.backup {
            config.backup = Some(backup.clone());
        }
        config.exceptions.extend(self.except.iter().cloned());
        config.clean_backup |= self.clean;
        if let Some(mode) = self.match_mode {
            config.match_mode = mode;
        }
        config.follow_symlinks |= self.follow_symlinks;
        if self.no_sweep_incomplete {
            config.sweep_incomplete = false;
        }
    }
}

/// Run the backup command
pub fn run(args: BackupArgs, mut config: MirrorConfig) -> anyhow::Result<()> {
    args.apply(&mut config);
    let job = config.to_job()?;

    let summary = run_job(&job, &TracingSink)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(())
}

fn print_summary(summary: &BackupSummary) {
    let sync = &summary.sync;
    let elapsed = sync.finished_at - sync.started_at;

    println!("Backup completed successfully!");
    println!("==============================");
    println!("Run ID:          {}", summary.run_id);
    println!("Source:          {}", summary.source.display());
    println!("Backup:          {}", summary.backup.display());
    println!("Paths processed: {}", sync.processed);
    println!(
        "Backed up:       {} ({} new, {} updated, {} folders)",
        sync.backed_up(),
        sync.copied,
        sync.updated,
        sync.dirs_created
    );
    println!("Sync time:       {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0);

    if sync.corrupted > 0 {
        println!("Corrupted files: {}", sync.corrupted);
    }
    if sync.markers_removed > 0 {
        println!("Stale .incomplete files removed: {}", sync.markers_removed);
    }
    if let Some(prune) = &summary.prune {
        println!("Re-copied:       {}", prune.recopied);
        println!("Removed:         {}", prune.total_removed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> BackupArgs {
        BackupArgs {
            source: None,
            backup: None,
            except: Vec::new(),
            clean: false,
            match_mode: None,
            follow_symlinks: false,
            no_sweep_incomplete: false,
            json: false,
        }
    }

    #[test]
    fn test_cli_values_override_config() {
        let mut config = MirrorConfig {
            source: Some(PathBuf::from("/from-config")),
            exceptions: vec!["a".to_string()],
            ..MirrorConfig::default()
        };
        let args = BackupArgs {
            source: Some(PathBuf::from("/from-cli")),
            backup: Some(PathBuf::from("/bak")),
            except: vec!["b".to_string()],
            clean: true,
            no_sweep_incomplete: true,
            ..args()
        };

        args.apply(&mut config);

        assert_eq!(config.source, Some(PathBuf::from("/from-cli")));
        assert_eq!(config.backup, Some(PathBuf::from("/bak")));
        assert_eq!(config.exceptions, vec!["a", "b"]);
        assert!(config.clean_backup);
        assert!(!config.sweep_incomplete);
    }

    #[test]
    fn test_absent_flags_keep_config_values() {
        let mut config = MirrorConfig {
            clean_backup: true,
            match_mode: MatchMode::Substring,
            ..MirrorConfig::default()
        };

        args().apply(&mut config);

        assert!(config.clean_backup);
        assert_eq!(config.match_mode, MatchMode::Substring);
        assert!(config.sweep_incomplete);
    }
}
