//! Email delivery for the mailqueue worker.
//!
//! This crate provides:
//! - [`Transport`]: the delivery collaborator, plus two bundled transports
//!   ([`LogTransport`] for dry runs, [`HttpRelayTransport`] for an HTTP relay)
//! - [`DeliveryWorker`]: claims a batch, sends each item, records outcomes
//!   and releases every lock it took
//! - [`build_transport`]: picks the transport named in the configuration

mod error;
mod http_relay;
mod log_transport;
mod transport;
mod worker;

#[cfg(test)]
mod tests;

pub use error::{SenderError, SenderResult, TransportError, TransportResult};
pub use http_relay::HttpRelayTransport;
pub use log_transport::LogTransport;
pub use transport::{OutgoingEmail, SendReceipt, SenderProfiles, Transport};
pub use worker::{
    stagger, BatchReport, DeliveryOutcome, DeliveryReport, DeliveryWorker, WorkerDefaults,
};

use mailqueue_core::{Config, CoreError, TransportKind};
use std::sync::Arc;
use std::time::Duration;

/// Build the transport selected by `config.transport`.
pub fn build_transport(config: &Config) -> SenderResult<Arc<dyn Transport>> {
    let profiles = SenderProfiles::from_config(config);

    match config.transport {
        TransportKind::Log => Ok(Arc::new(LogTransport::new(profiles))),
        TransportKind::Http => {
            let endpoint = config.relay_url()?.ok_or_else(|| {
                CoreError::Config("relay_url is required when transport is \"http\"".to_string())
            })?;
            let transport = HttpRelayTransport::new(
                endpoint,
                Duration::from_secs(config.send_timeout_secs),
                profiles,
            )?
            .with_auth_token(config.relay_token.clone());
            Ok(Arc::new(transport))
        }
    }
}
