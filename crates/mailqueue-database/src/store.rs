//! The queue store.

use crate::dispatcher::{self, ClaimRequest, RETRY_CEILING};
use crate::{
    queries, AsyncDatabase, Clock, DatabaseResult, EmailQueueItem, EmailRecipients,
    EnqueueOptions, JsonMap, NewEmailQueueItem, QueueStats, StaleLock, SystemClock,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Durable email queue backed by one SQLite connection.
///
/// Cheap to clone; clones share the connection. Workers in other processes
/// open their own store on the same file.
#[derive(Clone)]
pub struct QueueStore {
    db: AsyncDatabase,
    clock: Arc<dyn Clock>,
    retry_ceiling: u32,
}

impl QueueStore {
    /// Wrap an already opened database, using the wall clock.
    pub fn new(db: AsyncDatabase) -> Self {
        Self {
            db,
            clock: Arc::new(SystemClock),
            retry_ceiling: RETRY_CEILING,
        }
    }

    /// Open (creating and migrating if needed) the queue database at `path`.
    pub async fn open(path: &Path) -> DatabaseResult<Self> {
        Ok(Self::new(AsyncDatabase::open(path).await?))
    }

    /// Open a private in-memory queue.
    pub async fn open_in_memory() -> DatabaseResult<Self> {
        Ok(Self::new(AsyncDatabase::open_in_memory().await?))
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Change how many failures an item may accumulate and still be claimed.
    pub fn with_retry_ceiling(mut self, retry_ceiling: u32) -> Self {
        self.retry_ceiling = retry_ceiling;
        self
    }

    pub fn retry_ceiling(&self) -> u32 {
        self.retry_ceiling
    }

    pub fn database(&self) -> &AsyncDatabase {
        &self.db
    }

    /// Add an email to the queue and return its id.
    ///
    /// `data` becomes the item's template variables. `send_at` defaults to
    /// now. Fails with a validation error, writing nothing, when `to` is
    /// empty or an address is malformed.
    pub async fn enqueue(
        &self,
        recipients: EmailRecipients,
        data: JsonMap,
        options: EnqueueOptions,
    ) -> DatabaseResult<String> {
        queries::validate_recipients(&recipients)?;

        let now = self.clock.now();
        let item = NewEmailQueueItem {
            id: uuid::Uuid::new_v4().to_string(),
            recipients,
            template_vars: data,
            send_at: options.send_at.unwrap_or(now),
            options,
            created: now,
        };
        let id = item.id.clone();
        let send_at = item.send_at;

        self.db
            .call(move |conn| queries::insert_item(conn, &item))
            .await?;

        info!(id = %id, send_at = %send_at, "Enqueued email");
        Ok(id)
    }

    /// Atomically claim up to `max_size` due items, oldest first.
    ///
    /// The returned rows carry their pre-claim values; in storage they are
    /// now locked until released.
    pub async fn claim_batch(&self, max_size: usize) -> DatabaseResult<Vec<EmailQueueItem>> {
        if max_size == 0 {
            return Ok(Vec::new());
        }

        let request = ClaimRequest {
            max_size,
            retry_ceiling: self.retry_ceiling,
            now: self.clock.now(),
        };
        let batch = self
            .db
            .call(move |conn| dispatcher::claim_batch(conn, &request))
            .await?;

        debug!(requested = max_size, claimed = batch.len(), "Claim finished");
        Ok(batch)
    }

    /// Record a delivered item. Repeating it is harmless.
    pub async fn mark_success(
        &self,
        id: &str,
        from_email: Option<&str>,
        from_name: Option<&str>,
    ) -> DatabaseResult<()> {
        let now = self.clock.now();
        let (id_owned, from_email, from_name) = owned_outcome(id, from_email, from_name);

        let found = self
            .db
            .call(move |conn| {
                queries::mark_success(
                    conn,
                    &id_owned,
                    from_email.as_deref(),
                    from_name.as_deref(),
                    now,
                )
            })
            .await?;

        if !found {
            warn!(id = %id, "mark_success for unknown queue item");
        }
        Ok(())
    }

    /// Count one failed delivery attempt.
    pub async fn mark_failure(
        &self,
        id: &str,
        from_email: Option<&str>,
        from_name: Option<&str>,
    ) -> DatabaseResult<()> {
        let now = self.clock.now();
        let (id_owned, from_email, from_name) = owned_outcome(id, from_email, from_name);

        let found = self
            .db
            .call(move |conn| {
                queries::mark_failure(
                    conn,
                    &id_owned,
                    from_email.as_deref(),
                    from_name.as_deref(),
                    now,
                )
            })
            .await?;

        if !found {
            warn!(id = %id, "mark_failure for unknown queue item");
        }
        Ok(())
    }

    /// Unlock exactly the given items.
    pub async fn release_locks(&self, ids: &[String]) -> DatabaseResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let now = self.clock.now();
        let ids = ids.to_vec();
        let released = self
            .db
            .call(move |conn| queries::release_locks(conn, &ids, now))
            .await?;

        debug!(count = released, "Released locks");
        Ok(())
    }

    /// Unlock every row. Only safe while no worker is running.
    ///
    /// Returns how many rows were locked.
    pub async fn clear_all_locks(&self) -> DatabaseResult<usize> {
        let now = self.clock.now();
        let cleared = self
            .db
            .call(move |conn| queries::clear_all_locks(conn, now))
            .await?;

        info!(count = cleared, "Cleared all queue locks");
        Ok(cleared)
    }

    /// Look up one item.
    pub async fn get(&self, id: &str) -> DatabaseResult<Option<EmailQueueItem>> {
        let id = id.to_string();
        self.db.call(move |conn| queries::get_item(conn, &id)).await
    }

    pub async fn stats(&self) -> DatabaseResult<QueueStats> {
        let now = self.clock.now();
        let ceiling = self.retry_ceiling;
        self.db
            .call(move |conn| queries::queue_stats(conn, ceiling, now))
            .await
    }

    /// Locks not touched for longer than `older_than`.
    pub async fn stale_locks(&self, older_than: chrono::Duration) -> DatabaseResult<Vec<StaleLock>> {
        let cutoff = self.clock.now() - older_than;
        self.db
            .call(move |conn| queries::list_stale_locks(conn, cutoff))
            .await
    }
}

fn owned_outcome(
    id: &str,
    from_email: Option<&str>,
    from_name: Option<&str>,
) -> (String, Option<String>, Option<String>) {
    (
        id.to_string(),
        from_email.map(str::to_string),
        from_name.map(str::to_string),
    )
}
