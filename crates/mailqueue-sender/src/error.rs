//! Sender error types.

use std::time::Duration;
use thiserror::Error;

/// Why a single delivery attempt failed.
///
/// Always recovered by the worker, which counts it against the item.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The remote side refused the message
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The transport could not be reached
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// The attempt ran past the send timeout
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using TransportError.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors that abort a worker run.
#[derive(Error, Debug)]
pub enum SenderError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] mailqueue_database::DatabaseError),

    /// Transport setup error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] mailqueue_core::CoreError),
}

/// Result type alias using SenderError.
pub type SenderResult<T> = Result<T, SenderError>;
