//! Groundwork home directory layout.

use std::path::{Path, PathBuf};

use crate::errors::{GroundworkError, GroundworkResult};

/// Environment variable overriding the groundwork home directory.
pub const HOME_ENV: &str = "GROUNDWORK_HOME";

/// Filesystem layout rooted at the groundwork home directory.
///
/// Immutable after creation; `prepare()` creates the directory tree before
/// anything else runs.
#[derive(Debug, Clone)]
pub struct FilesystemLayout {
    home_dir: PathBuf,
}

impl FilesystemLayout {
    pub fn new(home_dir: PathBuf) -> Self {
        Self { home_dir }
    }

    /// Resolve the default layout from `$GROUNDWORK_HOME` or `~/.groundwork`.
    pub fn default_home() -> GroundworkResult<Self> {
        let home = match std::env::var_os(HOME_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .ok_or_else(|| {
                    GroundworkError::Config("cannot resolve a home directory".into())
                })?
                .join(".groundwork"),
        };
        Ok(Self::new(home))
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// Per-build working trees live under here, one directory per build id.
    pub fn builds_dir(&self) -> PathBuf {
        self.home_dir.join("builds")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join("logs")
    }

    pub fn db_dir(&self) -> PathBuf {
        self.home_dir.join("db")
    }

    /// Create the directory tree.
    pub fn prepare(&self) -> GroundworkResult<()> {
        for dir in [
            self.home_dir.clone(),
            self.builds_dir(),
            self.logs_dir(),
            self.db_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                GroundworkError::Storage(format!(
                    "failed to create {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_creates_tree() {
        let temp_dir = TempDir::new().unwrap();
        let layout = FilesystemLayout::new(temp_dir.path().join("home"));
        layout.prepare().unwrap();

        assert!(layout.builds_dir().is_dir());
        assert!(layout.logs_dir().is_dir());
        assert!(layout.db_dir().is_dir());
    }
}
