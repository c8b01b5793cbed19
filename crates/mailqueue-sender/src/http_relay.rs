//! HTTP relay transport.
//!
//! Each message is POSTed as JSON to a relay endpoint that owns the actual
//! mail delivery. A 2xx answer means accepted; a JSON body of the form
//! `{"success": false, "error": "..."}` is treated as a rejection too.

use crate::{OutgoingEmail, SendReceipt, SenderProfiles, Transport, TransportError, TransportResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Request payload for one message.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayRequest<'a> {
    queue_id: &'a str,
    from_email: &'a str,
    from_name: &'a str,
    message: &'a OutgoingEmail,
}

/// Optional response body from the relay.
#[derive(Debug, Deserialize)]
struct RelayResponse {
    #[serde(default = "accepted")]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

fn accepted() -> bool {
    true
}

/// Delivers through an HTTP relay.
pub struct HttpRelayTransport {
    client: Client,
    endpoint: Url,
    auth_token: Option<String>,
    profiles: SenderProfiles,
}

impl HttpRelayTransport {
    /// Create a relay transport. `timeout` bounds each request.
    pub fn new(endpoint: Url, timeout: Duration, profiles: SenderProfiles) -> TransportResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            auth_token: None,
            profiles,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }
}

#[async_trait]
impl Transport for HttpRelayTransport {
    async fn send(&self, message: &OutgoingEmail) -> TransportResult<SendReceipt> {
        let receipt = self.profiles.resolve(message);
        let request = RelayRequest {
            queue_id: &message.queue_id,
            from_email: &receipt.from_email,
            from_name: &receipt.from_name,
            message,
        };

        debug!(url = %self.endpoint, queue_id = %message.queue_id, "Posting to relay");

        let mut builder = self.client.post(self.endpoint.clone()).json(&request);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Unavailable(format!("relay timed out: {}", e))
            } else if e.is_connect() {
                TransportError::Unavailable(format!("relay unreachable: {}", e))
            } else {
                TransportError::Http(e)
            }
        })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(queue_id = %message.queue_id, status = %status, "Relay rejected message");
            return Err(TransportError::Rejected(format!("HTTP {}: {}", status, body)));
        }

        if !body.trim().is_empty() {
            if let Ok(result) = serde_json::from_str::<RelayResponse>(&body) {
                if !result.success {
                    return Err(TransportError::Rejected(
                        result.error.unwrap_or_else(|| "Unknown error".to_string()),
                    ));
                }
            }
        }

        Ok(receipt)
    }
}
