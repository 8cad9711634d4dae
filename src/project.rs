//! Locating the project a recording belongs to

use std::path::{Path, PathBuf};

use crate::{RecorderError, Result};

/// Directory that marks the root of a project
pub const PROJECT_DIR: &str = "protomok";

/// Directory under [`PROJECT_DIR`] that holds recorded mocks
pub const MOCKS_DIR: &str = "mocks";

/// Source of the directory recordings are stored under
pub trait ProjectStore {
    /// Root directory for mock artifacts
    ///
    /// # Errors
    ///
    /// Returns error if no project can be found
    fn mock_root(&self) -> Result<PathBuf>;
}

/// Finds the project by walking up the filesystem from a start directory
#[derive(Debug, Clone)]
pub struct FsProjectStore {
    start_dir: PathBuf,
}

impl FsProjectStore {
    /// Search upward from `start_dir`
    pub fn new(start_dir: impl Into<PathBuf>) -> Self {
        Self {
            start_dir: start_dir.into(),
        }
    }

    /// Search upward from the process working directory
    ///
    /// # Errors
    ///
    /// Returns error if the working directory cannot be read
    pub fn from_current_dir() -> Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    /// Nearest ancestor of the start directory (itself included) that
    /// contains a [`PROJECT_DIR`] directory
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::ProjectNotFound`] if the search reaches the
    /// filesystem root
    pub fn project_root(&self) -> Result<&Path> {
        self.start_dir
            .ancestors()
            .find(|dir| dir.join(PROJECT_DIR).is_dir())
            .ok_or_else(|| RecorderError::ProjectNotFound(self.start_dir.clone()))
    }
}

impl ProjectStore for FsProjectStore {
    fn mock_root(&self) -> Result<PathBuf> {
        Ok(self.project_root()?.join(PROJECT_DIR).join(MOCKS_DIR))
    }
}
