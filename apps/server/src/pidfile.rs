//! Pid-file bookkeeping.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Writes the process id on creation and removes the file on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Writes the current process id to `path`, replacing any previous file.
    pub fn create(path: &Path) -> Result<Self> {
        fs::write(path, std::process::id().to_string())
            .with_context(|| format!("Failed to write pid file: {}", path.display()))?;
        log::debug!("Wrote pid file {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Failed to remove pid file {}: {}", self.path.display(), e);
        }
    }
}
