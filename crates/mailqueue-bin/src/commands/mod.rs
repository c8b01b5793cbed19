//! Subcommand implementations.

pub mod enqueue;
pub mod locks;
pub mod send;
pub mod stats;

use mailqueue_core::{Config, Paths};
use mailqueue_database::QueueStore;
use std::path::PathBuf;
use tracing::debug;

/// Loaded configuration shared by every subcommand.
pub struct AppContext {
    pub config: Config,
    pub paths: Paths,
}

impl AppContext {
    pub fn new(config: Config, paths: Paths) -> Self {
        Self { config, paths }
    }

    pub fn database_file(&self) -> PathBuf {
        self.config.database_file(&self.paths)
    }

    /// Open the queue with the configured retry ceiling.
    pub async fn open_store(&self) -> anyhow::Result<QueueStore> {
        let path = self.database_file();
        debug!(path = %path.display(), "Opening queue");
        let store = QueueStore::open(&path)
            .await?
            .with_retry_ceiling(self.config.retry_ceiling);
        Ok(store)
    }
}

#[cfg(test)]
pub(crate) fn test_context(dir: &std::path::Path) -> AppContext {
    AppContext::new(Config::default(), Paths::with_base_dir(dir.to_path_buf()))
}
