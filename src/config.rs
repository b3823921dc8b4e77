use crate::exceptions::MatchMode;
use crate::job::MirrorJob;
use crate::sync::SyncOptions;
use crate::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Persistent settings for a backup profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub source: Option<PathBuf>,
    pub backup: Option<PathBuf>,
    /// Extra fragments excluded on top of the platform trash locations
    pub exceptions: Vec<String>,
    pub clean_backup: bool,
    pub match_mode: MatchMode,
    pub follow_symlinks: bool,
    pub sweep_incomplete: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            source: None,
            backup: None,
            exceptions: Vec::new(),
            clean_backup: false,
            match_mode: MatchMode::Component,
            follow_symlinks: false,
            sweep_incomplete: true,
            log_file: None,
        }
    }
}

impl MirrorConfig {
    /// Load config from `path`, or from the default location.
    ///
    /// An explicitly named file must exist; a missing default file yields the
    /// defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let default_path = Self::default_path()?;
                if default_path.exists() {
                    Self::load_from(&default_path)
                } else {
                    debug!("Config file not found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let content = fs::read_to_string(path).map_err(|e| {
            MirrorError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Save config to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                MirrorError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        fs::write(path, self.to_yaml()?)
            .map_err(|e| MirrorError::Config(format!("Failed to write config file: {}", e)))?;

        debug!("Config saved to {}", path.display());
        Ok(())
    }

    /// `<config dir>/mirror-backup/config.yaml`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| MirrorError::Config("Could not determine config directory".to_string()))?;

        Ok(config_dir.join("mirror-backup").join("config.yaml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.is_none() {
            return Err(MirrorError::Config("No source directory given".to_string()));
        }
        if self.backup.is_none() {
            return Err(MirrorError::Config("No backup directory given".to_string()));
        }
        if let Some(empty) = self.exceptions.iter().position(|f| f.trim().is_empty()) {
            return Err(MirrorError::Config(format!(
                "Exception #{} is empty",
                empty + 1
            )));
        }
        Ok(())
    }

    /// Validate and resolve into a runnable job
    pub fn to_job(&self) -> Result<MirrorJob> {
        self.validate()?;
        let source = self
            .source
            .as_deref()
            .ok_or_else(|| MirrorError::Config("No source directory given".to_string()))?;
        let backup = self
            .backup
            .as_deref()
            .ok_or_else(|| MirrorError::Config("No backup directory given".to_string()))?;

        let job = MirrorJob::resolve(source, backup, self.match_mode, &self.exceptions)?
            .clean_backup(self.clean_backup)
            .with_options(SyncOptions {
                follow_symlinks: self.follow_symlinks,
                sweep_incomplete: self.sweep_incomplete,
            });
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = MirrorConfig::default();
        assert!(!config.clean_backup);
        assert!(config.sweep_incomplete);
        assert_eq!(config.match_mode, MatchMode::Component);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_takes_defaults() -> Result<()> {
        let config = MirrorConfig::from_yaml(
            "source: /data\nbackup: /mnt/backup\nexceptions: [node_modules, .cache]\nmatch_mode: substring\n",
        )?;

        assert_eq!(config.source, Some(PathBuf::from("/data")));
        assert_eq!(config.exceptions, vec!["node_modules", ".cache"]);
        assert_eq!(config.match_mode, MatchMode::Substring);
        assert!(config.sweep_incomplete);
        assert!(!config.clean_backup);
        Ok(())
    }

    #[test]
    fn test_save_and_load_round_trip() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.yaml");
        let config = MirrorConfig {
            source: Some(PathBuf::from("/src")),
            backup: Some(PathBuf::from("/bak")),
            exceptions: vec!["tmp".to_string()],
            clean_backup: true,
            ..MirrorConfig::default()
        };

        config.save_to(&path)?;
        let loaded = MirrorConfig::load(Some(&path))?;

        assert_eq!(loaded, config);
        Ok(())
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = MirrorConfig::load(Some(&dir.path().join("absent.yaml"))).unwrap_err();
        assert!(matches!(err, MirrorError::Config(_)));
    }

    #[test]
    fn test_empty_exception_is_rejected() {
        let config = MirrorConfig {
            source: Some(PathBuf::from("/src")),
            backup: Some(PathBuf::from("/bak")),
            exceptions: vec!["ok".to_string(), "  ".to_string()],
            ..MirrorConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("#2"));
    }

    #[test]
    fn test_to_job_carries_options() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        fs::create_dir_all(&source).unwrap();
        let config = MirrorConfig {
            source: Some(source),
            backup: Some(dir.path().join("bak")),
            clean_backup: true,
            follow_symlinks: true,
            sweep_incomplete: false,
            ..MirrorConfig::default()
        };

        let job = config.to_job()?;

        assert!(job.clean_backup);
        assert!(job.options.follow_symlinks);
        assert!(!job.options.sweep_incomplete);
        Ok(())
    }
}
