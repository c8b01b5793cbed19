//! Configuration, paths, and logging shared by the mailqueue crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, SenderProfile, TransportKind, DEFAULT_BATCH_LIMIT, DEFAULT_LOG_LEVEL,
    DEFAULT_PROFILE, DEFAULT_RETRY_CEILING, DEFAULT_SEND_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level, LogFormat};
pub use paths::Paths;
