//! mirror-backup - incremental one-way directory mirroring
//!
//! Main binary entry point for the command-line interface.

use clap::Parser;
use mirror_backup::cli::{Cli, Commands};
use mirror_backup::log::{init_file_logging, init_logging};
use mirror_backup::MirrorConfig;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Backup(args) => {
            let config = MirrorConfig::load(cli.config.as_deref())?;
            match cli.log_file.as_ref().or(config.log_file.as_ref()) {
                Some(log_file) => init_file_logging(log_file, cli.verbose)?,
                None => init_logging(cli.verbose)?,
            }
            mirror_backup::cli::backup::run(args, config)
        }
        Commands::Config(args) => {
            init_logging(cli.verbose)?;
            mirror_backup::cli::config::run(args, cli.config.as_deref())
        }
    }
}
