//! Delivery worker: claim a batch, send each item, record outcomes, unlock.

use crate::{OutgoingEmail, SenderResult, Transport, TransportError};
use mailqueue_core::DEFAULT_SEND_TIMEOUT_SECS;
use mailqueue_database::{EmailQueueItem, QueueStore};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Placeholder value meaning "use the run default".
const DEFAULT_NAME: &str = "default";

/// Run-level fallbacks for items that left an identifier at its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerDefaults {
    pub template: String,
    pub layout: String,
    pub config: String,
}

impl Default for WorkerDefaults {
    fn default() -> Self {
        Self {
            template: DEFAULT_NAME.to_string(),
            layout: DEFAULT_NAME.to_string(),
            config: DEFAULT_NAME.to_string(),
        }
    }
}

impl WorkerDefaults {
    /// Pick the item's value unless it is empty or `"default"`.
    fn pick(item_value: &str, run_default: &str) -> String {
        if item_value.is_empty() || item_value == DEFAULT_NAME {
            run_default.to_string()
        } else {
            item_value.to_string()
        }
    }

    fn resolve(&self, item: &EmailQueueItem) -> OutgoingEmail {
        OutgoingEmail::from_item(
            item,
            Self::pick(&item.template, &self.template),
            Self::pick(&item.layout, &self.layout),
            Self::pick(&item.config, &self.config),
        )
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    Sent,
    Failed,
}

/// Per-item entry in a [`BatchReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub id: String,
    pub outcome: DeliveryOutcome,
    /// Transport error, if the attempt failed.
    pub error: Option<String>,
}

/// What one worker run did, in claimed order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub items: Vec<DeliveryReport>,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn sent(&self) -> usize {
        self.count(DeliveryOutcome::Sent)
    }

    pub fn failed(&self) -> usize {
        self.count(DeliveryOutcome::Failed)
    }

    fn count(&self, outcome: DeliveryOutcome) -> usize {
        self.items.iter().filter(|r| r.outcome == outcome).count()
    }
}

/// Processes claimed batches against one store and one transport.
pub struct DeliveryWorker {
    store: QueueStore,
    transport: Arc<dyn Transport>,
    defaults: WorkerDefaults,
    send_timeout: Duration,
}

impl DeliveryWorker {
    pub fn new(store: QueueStore, transport: Arc<dyn Transport>) -> Self {
        Self {
            store,
            transport,
            defaults: WorkerDefaults::default(),
            send_timeout: Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECS),
        }
    }

    pub fn with_defaults(mut self, defaults: WorkerDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Bound each transport call; running past it counts as a failure.
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    /// Claim up to `limit` items and try to deliver each one.
    ///
    /// Every claimed item is unlocked before returning, whatever its
    /// transport outcome. A storage error while claiming, recording an
    /// outcome or unlocking aborts the run; items already claimed stay
    /// locked until `clear-locks`, so a delivered message is never handed
    /// out again before its success is stored.
    pub async fn run_batch(&self, limit: usize) -> SenderResult<BatchReport> {
        let batch = self.store.claim_batch(limit).await?;
        if batch.is_empty() {
            debug!("No queued emails due");
            return Ok(BatchReport::default());
        }

        info!(count = batch.len(), "Processing email batch");

        let mut report = BatchReport::default();
        for item in &batch {
            match self.deliver(item).await {
                Ok(entry) => report.items.push(entry),
                Err(e) => {
                    error!(
                        id = %item.id,
                        claimed = batch.len(),
                        error = %e,
                        "Failed to record delivery outcome; batch left locked"
                    );
                    return Err(e);
                }
            }
        }

        let ids: Vec<String> = batch.iter().map(|item| item.id.clone()).collect();
        self.store.release_locks(&ids).await?;

        info!(
            sent = report.sent(),
            failed = report.failed(),
            "Email batch finished"
        );
        Ok(report)
    }

    async fn deliver(&self, item: &EmailQueueItem) -> SenderResult<DeliveryReport> {
        let message = self.defaults.resolve(item);

        let attempt = match tokio::time::timeout(self.send_timeout, self.transport.send(&message)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.send_timeout)),
        };

        match attempt {
            Ok(receipt) => {
                debug!(id = %item.id, from = %receipt.from_email, "Email sent");
                self.store
                    .mark_success(&item.id, Some(&receipt.from_email), Some(&receipt.from_name))
                    .await?;
                Ok(DeliveryReport {
                    id: item.id.clone(),
                    outcome: DeliveryOutcome::Sent,
                    error: None,
                })
            }
            Err(e) => {
                warn!(
                    id = %item.id,
                    attempt = item.send_retries + 1,
                    error = %e,
                    "Email delivery failed"
                );
                self.store
                    .mark_failure(&item.id, item.from_email.as_deref(), item.from_name.as_deref())
                    .await?;
                Ok(DeliveryReport {
                    id: item.id.clone(),
                    outcome: DeliveryOutcome::Failed,
                    error: Some(e.to_string()),
                })
            }
        }
    }
}

/// Sleep a random time in `[0, max]` so scheduled workers don't all start
/// at once.
pub async fn stagger(max: Duration) -> Duration {
    let delay = stagger_delay(max);
    if !delay.is_zero() {
        info!(delay_ms = delay.as_millis() as u64, "Staggering start");
        tokio::time::sleep(delay).await;
    }
    delay
}

fn stagger_delay(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_prefers_explicit_item_value() {
        assert_eq!(WorkerDefaults::pick("welcome", "fallback"), "welcome");
        assert_eq!(WorkerDefaults::pick("default", "fallback"), "fallback");
        assert_eq!(WorkerDefaults::pick("", "fallback"), "fallback");
    }

    #[test]
    fn stagger_delay_stays_in_range() {
        assert_eq!(stagger_delay(Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            assert!(stagger_delay(Duration::from_secs(2)) <= Duration::from_secs(2));
        }
    }

    #[test]
    fn batch_report_counts() {
        let report = BatchReport {
            items: vec![
                DeliveryReport {
                    id: "a".to_string(),
                    outcome: DeliveryOutcome::Sent,
                    error: None,
                },
                DeliveryReport {
                    id: "b".to_string(),
                    outcome: DeliveryOutcome::Failed,
                    error: Some("nope".to_string()),
                },
            ],
        };
        assert_eq!(report.len(), 2);
        assert_eq!(report.sent(), 1);
        assert_eq!(report.failed(), 1);
        assert!(BatchReport::default().is_empty());
    }
}
