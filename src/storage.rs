use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const PROJECT_DIR: &str = ".dreamlog";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalScope {
    Project,
    Global,
}

#[derive(Debug, Clone)]
pub struct JournalLocation {
    pub path: PathBuf,
    pub scope: JournalScope,
}

pub fn init_project_journal() -> Result<JournalLocation> {
    let cwd = env::current_dir()?;
    let dir = cwd.join(PROJECT_DIR);
    fs::create_dir_all(&dir).context("failed to create .dreamlog directory")?;
    Ok(JournalLocation {
        path: dir,
        scope: JournalScope::Project,
    })
}

/// The nearest `.dreamlog` directory above `start`, else the per-user data dir.
pub fn locate_journal(start: &Path) -> Result<JournalLocation> {
    if let Some(project_path) = find_project_journal(start) {
        return Ok(JournalLocation {
            path: project_path,
            scope: JournalScope::Project,
        });
    }
    Ok(JournalLocation {
        path: global_data_dir()?,
        scope: JournalScope::Global,
    })
}

fn find_project_journal(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        let candidate = current.join(PROJECT_DIR);
        if candidate.is_dir() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "dreamlog").context("locating data directory")
}

pub fn global_data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

pub fn global_config_file() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.yml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_project_dir_in_ancestors() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join(PROJECT_DIR)).unwrap();
        let nested = root.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        let location = locate_journal(&nested).unwrap();
        assert_eq!(location.scope, JournalScope::Project);
        assert_eq!(location.path, root.path().join(PROJECT_DIR));
    }
}
