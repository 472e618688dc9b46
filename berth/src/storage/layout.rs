//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::BerthError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// On-disk layout of the daemon
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Persisted applications and deployments
    pub fn state_file(&self) -> File {
        File::new(self.base_dir.join("state.json"))
    }

    /// Per-deployment log files, grouped by application
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Daemon's own rolling log files
    pub fn daemon_logs_dir(&self) -> Dir {
        self.logs_dir().subdir("daemon")
    }

    /// Working trees of git applications
    pub fn applications_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("applications"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), BerthError> {
        self.logs_dir().create().await?;
        self.applications_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("/etc/berth")
    }
}
