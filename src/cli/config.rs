//! Config command implementation.

use crate::MirrorConfig;
use clap::{Args, Subcommand};
use std::path::Path;

/// Arguments for the config command
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the config command
pub fn run(args: ConfigArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => MirrorConfig::default_path()?,
    };

    match args.command {
        ConfigCommand::Show => {
            let config = MirrorConfig::load(config_path)?;
            println!("# {}", describe(&path));
            print!("{}", config.to_yaml()?);
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file {} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            MirrorConfig::default().save_to(&path)?;
            println!("Config written to {}", path.display());
        }
    }

    Ok(())
}

fn describe(path: &Path) -> String {
    if path.exists() {
        format!("loaded from {}", path.display())
    } else {
        format!("defaults ({} not found)", path.display())
    }
}
