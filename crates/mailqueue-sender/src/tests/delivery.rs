//! Worker cycles against the mock transport.

use super::harness::{MockResponse, MockTransport, TestHarness, MOCK_FROM_EMAIL, MOCK_FROM_NAME};
use crate::{DeliveryOutcome, SenderError, TransportError, WorkerDefaults};
use mailqueue_database::{EnqueueOptions, RETRY_CEILING};
use std::time::Duration;

/// Every claimed item is unlocked after a cycle, whatever happened to it.
#[tokio::test]
async fn cycle_releases_every_lock() {
    let harness = TestHarness::new().await;
    let ids = harness.enqueue_many(4).await;

    let transport = MockTransport::new();
    transport.queue_response(MockResponse::Accept);
    transport.queue_response(MockResponse::Reject("bad mailbox".to_string()));
    transport.queue_response(MockResponse::Unavailable);
    transport.queue_response(MockResponse::Accept);

    let report = harness.worker(transport.clone()).run_batch(10).await.unwrap();

    assert_eq!(report.len(), 4);
    assert_eq!(report.sent(), 2);
    assert_eq!(report.failed(), 2);
    assert!(harness.locked_ids(&ids).await.is_empty());

    // Reports follow claimed order
    let reported: Vec<_> = report.items.iter().map(|r| r.id.clone()).collect();
    assert_eq!(reported, ids);
    assert_eq!(transport.sent_ids(), ids);
}

/// Install a trigger that makes any UPDATE touching `column` fail.
async fn fail_updates_of(harness: &TestHarness, column: &'static str) {
    harness
        .store
        .database()
        .call_sqlite(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TRIGGER fail_{column} BEFORE UPDATE OF {column} ON email_queue
                 BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;"
            ))
        })
        .await
        .unwrap();
}

/// A delivered item whose success can't be stored stays locked instead of
/// going back to the queue.
#[tokio::test]
async fn unrecorded_success_keeps_batch_locked() {
    let harness = TestHarness::new().await;
    let ids = harness.enqueue_many(2).await;
    fail_updates_of(&harness, "sent").await;

    let transport = MockTransport::new();
    let worker = harness.worker(transport.clone());

    let err = worker.run_batch(10).await.unwrap_err();
    assert!(matches!(err, SenderError::Database(_)));

    // The run stopped at the first item; nothing was unlocked
    assert_eq!(transport.sent_ids(), ids[..1]);
    assert_eq!(harness.locked_ids(&ids).await, ids);
    let first = harness.store.get(&ids[0]).await.unwrap().unwrap();
    assert!(first.locked);
    assert!(!first.sent);

    // The next cycle must not deliver it a second time
    assert!(worker.run_batch(10).await.unwrap().is_empty());
    assert_eq!(transport.messages().len(), 1);
}

/// Same for a failed attempt whose retry count can't be stored.
#[tokio::test]
async fn unrecorded_failure_keeps_batch_locked() {
    let harness = TestHarness::new().await;
    let id = harness.enqueue("flaky@example.com").await;
    fail_updates_of(&harness, "send_retries").await;

    let transport = MockTransport::new();
    transport.queue_response(MockResponse::Unavailable);
    let worker = harness.worker(transport.clone());

    let err = worker.run_batch(10).await.unwrap_err();
    assert!(matches!(err, SenderError::Database(_)));

    let item = harness.store.get(&id).await.unwrap().unwrap();
    assert!(item.locked);
    assert_eq!(item.send_retries, 0);
    assert!(worker.run_batch(10).await.unwrap().is_empty());

    // The recovery sweep hands it back out
    assert_eq!(harness.store.clear_all_locks().await.unwrap(), 1);
    assert_eq!(harness.store.claim_batch(10).await.unwrap().len(), 1);
}

/// One failing item does not stop the rest of the batch.
#[tokio::test]
async fn failure_does_not_abort_batch() {
    let harness = TestHarness::new().await;
    let ids = harness.enqueue_many(3).await;

    let transport = MockTransport::new();
    transport.queue_response(MockResponse::Reject("nope".to_string()));

    let report = harness.worker(transport).run_batch(10).await.unwrap();
    assert_eq!(report.items[0].outcome, DeliveryOutcome::Failed);
    assert_eq!(report.items[0].error.as_deref(), Some("Rejected: nope"));
    assert_eq!(report.items[1].outcome, DeliveryOutcome::Sent);
    assert_eq!(report.items[2].outcome, DeliveryOutcome::Sent);

    let first = harness.store.get(&ids[0]).await.unwrap().unwrap();
    assert_eq!(first.send_retries, 1);
    assert!(!first.sent);
    let second = harness.store.get(&ids[1]).await.unwrap().unwrap();
    assert!(second.sent);
    assert_eq!(second.from_email.as_deref(), Some(MOCK_FROM_EMAIL));
    assert_eq!(second.from_name.as_deref(), Some(MOCK_FROM_NAME));
}

/// An empty queue is a no-op cycle.
#[tokio::test]
async fn empty_queue_yields_empty_report() {
    let harness = TestHarness::new().await;
    let transport = MockTransport::new();

    let report = harness.worker(transport.clone()).run_batch(10).await.unwrap();
    assert!(report.is_empty());
    assert!(transport.messages().is_empty());
}

/// The batch limit caps how many items one cycle touches.
#[tokio::test]
async fn cycle_respects_limit() {
    let harness = TestHarness::new().await;
    let ids = harness.enqueue_many(5).await;
    let transport = MockTransport::new();
    let worker = harness.worker(transport.clone());

    let report = worker.run_batch(2).await.unwrap();
    assert_eq!(report.len(), 2);
    assert_eq!(transport.sent_ids(), ids[..2]);

    assert_eq!(worker.run_batch(0).await.unwrap().len(), 0);
    assert_eq!(worker.run_batch(10).await.unwrap().len(), 3);
}

/// An item that keeps failing stops being claimed after the ceiling.
#[tokio::test]
async fn retry_ceiling_excludes_item() {
    let harness = TestHarness::new().await;
    let id = harness.enqueue("bounce@example.com").await;

    let transport = MockTransport::new();
    transport.set_default_response(MockResponse::Reject("bounced".to_string()));
    let worker = harness.worker(transport.clone());

    for _ in 0..=RETRY_CEILING {
        assert_eq!(worker.run_batch(10).await.unwrap().failed(), 1);
    }

    // ceiling + 1 failures: never handed out again
    assert!(worker.run_batch(10).await.unwrap().is_empty());
    assert_eq!(transport.messages().len(), RETRY_CEILING as usize + 1);

    let item = harness.store.get(&id).await.unwrap().unwrap();
    assert_eq!(item.send_retries, RETRY_CEILING + 1);
    assert!(!item.sent);
    assert!(!item.locked);
    assert_eq!(harness.store.stats().await.unwrap().exhausted, 1);
}

/// A transport call running past the timeout is a failure.
#[tokio::test]
async fn slow_transport_times_out() {
    let harness = TestHarness::new().await;
    let id = harness.enqueue("slow@example.com").await;

    let transport = MockTransport::new();
    transport.queue_response(MockResponse::DelayThenAccept(Duration::from_secs(5)));

    let report = harness
        .worker(transport)
        .with_send_timeout(Duration::from_millis(50))
        .run_batch(10)
        .await
        .unwrap();

    assert_eq!(report.failed(), 1);
    let expected = TransportError::Timeout(Duration::from_millis(50)).to_string();
    assert_eq!(report.items[0].error.as_deref(), Some(expected.as_str()));

    let item = harness.store.get(&id).await.unwrap().unwrap();
    assert_eq!(item.send_retries, 1);
    assert!(!item.sent);
    assert!(!item.locked);
}

/// Items that leave identifiers at "default" pick up the run defaults.
#[tokio::test]
async fn identifiers_resolve_against_run_defaults() {
    let harness = TestHarness::new().await;
    harness.enqueue("plain@example.com").await;
    harness.clock.advance(chrono::Duration::milliseconds(1));
    harness
        .enqueue_with(
            "custom@example.com",
            EnqueueOptions {
                template: "receipt".to_string(),
                layout: "minimal".to_string(),
                config: "billing".to_string(),
                ..Default::default()
            },
        )
        .await;

    let transport = MockTransport::new();
    harness
        .worker(transport.clone())
        .with_defaults(WorkerDefaults {
            template: "newsletter".to_string(),
            layout: "branded".to_string(),
            config: "marketing".to_string(),
        })
        .run_batch(10)
        .await
        .unwrap();

    let messages = transport.messages();
    assert_eq!(messages.len(), 2);

    assert_eq!(messages[0].template, "newsletter");
    assert_eq!(messages[0].layout, "branded");
    assert_eq!(messages[0].config, "marketing");

    assert_eq!(messages[1].template, "receipt");
    assert_eq!(messages[1].layout, "minimal");
    assert_eq!(messages[1].config, "billing");
}

/// Marking success twice leaves the item sent and unchanged otherwise.
#[tokio::test]
async fn success_is_idempotent() {
    let harness = TestHarness::new().await;
    let id = harness.enqueue("twice@example.com").await;
    let store = &harness.store;

    store
        .mark_success(&id, Some("a@example.com"), Some("A"))
        .await
        .unwrap();
    let once = store.get(&id).await.unwrap().unwrap();

    store
        .mark_success(&id, Some("a@example.com"), Some("A"))
        .await
        .unwrap();
    let twice = store.get(&id).await.unwrap().unwrap();

    assert!(twice.sent);
    assert_eq!(once, twice);
}
