//! File system paths for the queue tooling.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Directory name under the user's home directory.
const BASE_DIR_NAME: &str = ".mailqueue";
/// SQLite database filename under the base directory.
const DATABASE_FILE_NAME: &str = "queue.sqlite";

/// Manages file system paths for the queue.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for config and data (~/.mailqueue)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.mailqueue`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.mailqueue).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.mailqueue/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the queue database path (~/.mailqueue/queue.sqlite).
    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join(DATABASE_FILE_NAME)
    }
}
