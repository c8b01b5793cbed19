//! Configuration management for the queue worker.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Name of the sender profile used when an item does not pick one.
pub const DEFAULT_PROFILE: &str = "default";

/// Failed attempts tolerated before an item stops being claimed.
pub const DEFAULT_RETRY_CEILING: u32 = 3;

/// Items claimed per worker run.
pub const DEFAULT_BATCH_LIMIT: usize = 50;

/// Upper bound on a single transport call.
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 30;

/// Which bundled transport the worker delivers through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Log the message and report success (dry run).
    #[default]
    Log,
    /// POST the message to an HTTP relay.
    Http,
}

/// Sender identity bound to an email config name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderProfile {
    pub from_email: String,
    pub from_name: String,
}

impl Default for SenderProfile {
    fn default() -> Self {
        Self {
            from_email: "no-reply@localhost".to_string(),
            from_name: "Mailqueue".to_string(),
        }
    }
}

/// Main worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Database file override; `Paths::database_file` when unset.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Items with more failed attempts than this are no longer claimed.
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,
    /// Default batch size for `send`.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    /// Timeout applied to each transport call.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Transport used by the worker.
    #[serde(default)]
    pub transport: TransportKind,
    /// Relay endpoint for the HTTP transport.
    #[serde(default)]
    pub relay_url: Option<String>,
    /// Bearer token sent to the relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_token: Option<String>,
    /// Sender profiles keyed by email config name.
    #[serde(default = "default_profiles")]
    pub profiles: BTreeMap<String, SenderProfile>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_retry_ceiling() -> u32 {
    DEFAULT_RETRY_CEILING
}

fn default_batch_limit() -> usize {
    DEFAULT_BATCH_LIMIT
}

fn default_send_timeout_secs() -> u64 {
    DEFAULT_SEND_TIMEOUT_SECS
}

fn default_profiles() -> BTreeMap<String, SenderProfile> {
    let mut profiles = BTreeMap::new();
    profiles.insert(DEFAULT_PROFILE.to_string(), SenderProfile::default());
    profiles
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            database_path: None,
            retry_ceiling: DEFAULT_RETRY_CEILING,
            batch_limit: DEFAULT_BATCH_LIMIT,
            send_timeout_secs: DEFAULT_SEND_TIMEOUT_SECS,
            transport: TransportKind::default(),
            relay_url: None,
            relay_token: None,
            profiles: default_profiles(),
        }
    }
}

impl Config {
    /// Load configuration from the config file, falling back to defaults.
    ///
    /// Environment variables are applied on top of the file.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&content)?;
        config
            .profiles
            .entry(DEFAULT_PROFILE.to_string())
            .or_default();
        Ok(config)
    }

    /// Override configuration from the process environment.
    fn load_from_env(&mut self) {
        self.apply_env_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `MAILQUEUE_*` overrides using the given variable lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(log_level) = lookup("MAILQUEUE_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(database) = lookup("MAILQUEUE_DATABASE") {
            self.database_path = Some(PathBuf::from(database));
        }
        if let Some(relay_url) = lookup("MAILQUEUE_RELAY_URL") {
            self.relay_url = Some(relay_url);
        }
        if let Some(token) = lookup("MAILQUEUE_RELAY_TOKEN") {
            self.relay_token = Some(token);
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> CoreResult<()> {
        if self.batch_limit == 0 {
            return Err(CoreError::Config("batch_limit must be at least 1".to_string()));
        }
        if self.send_timeout_secs == 0 {
            return Err(CoreError::Config(
                "send_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.transport == TransportKind::Http && self.relay_url.is_none() {
            return Err(CoreError::Config(
                "relay_url is required when transport is \"http\"".to_string(),
            ));
        }
        self.relay_url()?;
        Ok(())
    }

    /// Resolve the database file, honoring the override.
    pub fn database_file(&self, paths: &Paths) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| paths.database_file())
    }

    /// Get the relay URL as a parsed URL.
    pub fn relay_url(&self) -> CoreResult<Option<Url>> {
        self.relay_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(CoreError::from)
    }

}
