use crate::storage::{self, JournalLocation, JournalScope};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "DREAMLOG_DATA_DIR";
pub const REMOTE_DIR_ENV: &str = "DREAMLOG_REMOTE_DIR";
pub const OWNER_ENV: &str = "DREAMLOG_OWNER";

/// Optional `config.yml` in the platform config directory.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    pub remote_dir: Option<PathBuf>,
    pub owner_id: Option<String>,
}

/// Values given on the command line; they win over everything else.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub remote_dir: Option<PathBuf>,
    pub owner_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub location: JournalLocation,
    pub remote_dir: Option<PathBuf>,
    pub owner_id: Option<String>,
}

impl Config {
    pub fn load(cwd: &Path, overrides: Overrides) -> Result<Self> {
        let file = match storage::global_config_file() {
            Ok(path) => read_file_config(&path)?,
            Err(err) => {
                tracing::debug!(%err, "no config directory, skipping config file");
                FileConfig::default()
            }
        };
        let vars = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self::resolve(cwd, file, vars, overrides)
    }

    /// Layers defaults, config file, environment and command line, in that order.
    pub fn resolve(
        cwd: &Path,
        file: FileConfig,
        vars: impl Fn(&str) -> Option<String>,
        overrides: Overrides,
    ) -> Result<Self> {
        let data_dir = overrides
            .data_dir
            .or_else(|| vars(DATA_DIR_ENV).map(PathBuf::from))
            .or(file.data_dir);
        let location = match data_dir {
            Some(path) => JournalLocation {
                path,
                scope: JournalScope::Global,
            },
            None => storage::locate_journal(cwd)?,
        };
        Ok(Config {
            location,
            remote_dir: overrides
                .remote_dir
                .or_else(|| vars(REMOTE_DIR_ENV).map(PathBuf::from))
                .or(file.remote_dir),
            owner_id: overrides
                .owner_id
                .or_else(|| vars(OWNER_ENV))
                .or(file.owner_id),
        })
    }

    /// Remote sync needs both a store and an account to scope it to.
    pub fn remote(&self) -> Option<(&Path, &str)> {
        match (&self.remote_dir, &self.owner_id) {
            (Some(dir), Some(owner)) => Some((dir.as_path(), owner.as_str())),
            _ => None,
        }
    }
}

pub fn read_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let data = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    serde_yaml::from_str(&data).with_context(|| format!("parsing {:?}", path))
}
