//! Batch claiming.
//!
//! A claim selects the oldest eligible rows and locks them inside one
//! `BEGIN IMMEDIATE` transaction. SQLite lets only one immediate writer in
//! at a time, so two workers racing for the same rows serialize here and the
//! second one only sees what the first left unlocked.

use crate::queries::{lock_items, select_claimable};
use crate::{DatabaseError, DatabaseResult, EmailQueueItem};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use tracing::debug;

/// Rows with more failed attempts than this are never claimed again.
pub const RETRY_CEILING: u32 = 3;

/// Parameters for one claim.
#[derive(Debug, Clone, Copy)]
pub struct ClaimRequest {
    pub max_size: usize,
    pub retry_ceiling: u32,
    pub now: DateTime<Utc>,
}

impl ClaimRequest {
    pub fn new(max_size: usize, now: DateTime<Utc>) -> Self {
        Self {
            max_size,
            retry_ceiling: RETRY_CEILING,
            now,
        }
    }
}

/// Claim up to `request.max_size` eligible rows.
///
/// Eligible means unsent, unlocked, due, and at most `retry_ceiling`
/// failures. Rows come back oldest `created` first, as they looked before
/// the lock was taken (`locked == false`); the stored rows are locked.
/// Nothing is locked if the transaction fails.
pub fn claim_batch(conn: &mut Connection, request: &ClaimRequest) -> DatabaseResult<Vec<EmailQueueItem>> {
    if request.max_size == 0 {
        return Ok(Vec::new());
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let items = select_claimable(&tx, request.retry_ceiling, request.now, request.max_size)?;
    if items.is_empty() {
        tx.commit()?;
        return Ok(items);
    }

    let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
    let locked = lock_items(&tx, &ids, request.now)?;
    if locked != ids.len() {
        // Dropping the transaction rolls it back.
        return Err(DatabaseError::InvalidData(format!(
            "claimed {} rows but locked {}",
            ids.len(),
            locked
        )));
    }

    tx.commit()?;
    debug!(count = items.len(), "Claimed batch");
    Ok(items)
}
