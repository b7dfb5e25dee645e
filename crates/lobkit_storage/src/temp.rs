//! Temporary file provisioning.

use crate::error::StorageResult;
use crate::file::FileLob;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Creates temporary files for overflow storage.
///
/// Files returned by a provider are deleted when the returned [`FileLob`] is
/// dropped; callers that need to release early simply drop the file.
pub trait TempFileProvider: Send + Sync {
    /// Creates a new, empty temporary file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    fn create_temp_file(&self, prefix: &str, suffix: &str) -> StorageResult<FileLob>;
}

/// Creates temporary files inside one directory.
#[derive(Debug, Clone)]
pub struct TempDirProvider {
    dir: PathBuf,
}

impl TempDirProvider {
    /// Creates a provider using the given directory.
    ///
    /// The directory is created on first use if it doesn't exist.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory files are created in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Default for TempDirProvider {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl TempFileProvider for TempDirProvider {
    fn create_temp_file(&self, prefix: &str, suffix: &str) -> StorageResult<FileLob> {
        std::fs::create_dir_all(&self.dir)?;
        let temp = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&self.dir)?;
        debug!(path = %temp.path().display(), "created temporary file");
        FileLob::from_temp(temp)
    }
}
