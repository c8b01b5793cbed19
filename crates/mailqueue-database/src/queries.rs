//! Standalone query functions that work with any Connection.
//!
//! Each function takes a `&Connection` (or a transaction, which derefs to
//! one) as its first parameter and the current time where it writes
//! `modified`, so callers control the clock.

use crate::{
    DatabaseError, DatabaseResult, EmailFormat, EmailQueueItem, EmailRecipients, JsonMap,
    NewEmailQueueItem, QueueStats, Recipients, StaleLock, ADDRESS_SEPARATOR,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row, ToSql};
use tracing::debug;

/// Column list matching [`map_item_row`].
pub const ITEM_COLUMNS: &str = "id, email_to, email_cc, email_bcc, email_reply_to, from_email, from_name, \
     subject, config, template, layout, theme, format, template_vars, headers, \
     sent, locked, send_retries, send_at, created, modified";

// ==========================================
// Enqueue
// ==========================================

/// Reject recipient sets that cannot be stored faithfully.
pub fn validate_recipients(recipients: &EmailRecipients) -> DatabaseResult<()> {
    if recipients.to.is_empty() {
        return Err(DatabaseError::Validation(
            "at least one `to` recipient is required".to_string(),
        ));
    }

    let fields = [
        ("to", &recipients.to),
        ("cc", &recipients.cc),
        ("bcc", &recipients.bcc),
        ("reply_to", &recipients.reply_to),
    ];
    for (field, list) in fields {
        for address in list.as_slice() {
            if address.trim().is_empty() {
                return Err(DatabaseError::Validation(format!(
                    "empty address in `{}`",
                    field
                )));
            }
            if address.contains(ADDRESS_SEPARATOR) {
                return Err(DatabaseError::Validation(format!(
                    "address {:?} in `{}` contains a '{}'; pass a list instead",
                    address, field, ADDRESS_SEPARATOR
                )));
            }
        }
    }
    Ok(())
}

/// Insert a new queue row. Validation runs before anything is written.
pub fn insert_item(conn: &Connection, item: &NewEmailQueueItem) -> DatabaseResult<()> {
    validate_recipients(&item.recipients)?;

    let template_vars = serde_json::to_string(&item.template_vars)?;
    let headers = serde_json::to_string(&item.options.headers)?;
    let created = to_millis(item.created);

    conn.execute(
        "INSERT INTO email_queue (id, email_to, email_cc, email_bcc, email_reply_to,
                                  subject, config, template, layout, theme, format,
                                  template_vars, headers, sent, locked, send_retries,
                                  send_at, created, modified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 0, 0, 0, ?14, ?15, ?15)",
        params![
            item.id,
            item.recipients.to.to_column(),
            item.recipients.cc.to_column(),
            item.recipients.bcc.to_column(),
            item.recipients.reply_to.to_column(),
            item.options.subject,
            item.options.config,
            item.options.template,
            item.options.layout,
            item.options.theme,
            item.options.format.as_str(),
            template_vars,
            headers,
            to_millis(item.send_at),
            created,
        ],
    )?;
    debug!(id = %item.id, "Inserted queue item");
    Ok(())
}

/// Get a queue item by ID.
pub fn get_item(conn: &Connection, id: &str) -> DatabaseResult<Option<EmailQueueItem>> {
    let sql = format!("SELECT {} FROM email_queue WHERE id = ?1", ITEM_COLUMNS);
    let mut stmt = conn.prepare_cached(&sql)?;

    match stmt.query_row(params![id], map_item_row) {
        Ok(item) => Ok(Some(item)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ==========================================
// Claim primitives (run inside the dispatcher's transaction)
// ==========================================

/// Select up to `limit` claimable rows, oldest first.
pub fn select_claimable(
    conn: &Connection,
    retry_ceiling: u32,
    now: DateTime<Utc>,
    limit: usize,
) -> DatabaseResult<Vec<EmailQueueItem>> {
    let sql = format!(
        "SELECT {} FROM email_queue
         WHERE sent = 0 AND locked = 0 AND send_retries <= ?1 AND send_at <= ?2
         ORDER BY created ASC, rowid ASC
         LIMIT ?3",
        ITEM_COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let rows = stmt
        .query_map(params![retry_ceiling, to_millis(now), limit], map_item_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Set `locked = 1` on the given rows that are still unlocked.
///
/// Returns the number of rows locked.
pub fn lock_items(conn: &Connection, ids: &[String], now: DateTime<Utc>) -> DatabaseResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "UPDATE email_queue SET locked = 1, modified = ?1
         WHERE locked = 0 AND id IN ({})",
        placeholders(ids.len())
    );
    update_ids(conn, &sql, to_millis(now), ids)
}

// ==========================================
// Outcomes
// ==========================================

/// Mark an item as sent and record the sender identity.
///
/// Safe to repeat; returns whether the row exists.
pub fn mark_success(
    conn: &Connection,
    id: &str,
    from_email: Option<&str>,
    from_name: Option<&str>,
    now: DateTime<Utc>,
) -> DatabaseResult<bool> {
    let updated = conn.execute(
        "UPDATE email_queue
         SET sent = 1, from_email = ?2, from_name = ?3, modified = ?4
         WHERE id = ?1",
        params![id, from_email, from_name, to_millis(now)],
    )?;
    Ok(updated > 0)
}

/// Count a failed delivery attempt. Leaves `sent` and `locked` untouched.
pub fn mark_failure(
    conn: &Connection,
    id: &str,
    from_email: Option<&str>,
    from_name: Option<&str>,
    now: DateTime<Utc>,
) -> DatabaseResult<bool> {
    let updated = conn.execute(
        "UPDATE email_queue
         SET send_retries = send_retries + 1, from_email = ?2, from_name = ?3, modified = ?4
         WHERE id = ?1",
        params![id, from_email, from_name, to_millis(now)],
    )?;
    Ok(updated > 0)
}

// ==========================================
// Locks
// ==========================================

/// Clear the lock on exactly the given rows.
pub fn release_locks(conn: &Connection, ids: &[String], now: DateTime<Utc>) -> DatabaseResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "UPDATE email_queue SET locked = 0, modified = ?1 WHERE id IN ({})",
        placeholders(ids.len())
    );
    update_ids(conn, &sql, to_millis(now), ids)
}

/// Clear every lock in the table. Returns how many rows were locked.
pub fn clear_all_locks(conn: &Connection, now: DateTime<Utc>) -> DatabaseResult<usize> {
    let cleared = conn.execute(
        "UPDATE email_queue SET locked = 0, modified = ?1 WHERE locked = 1",
        params![to_millis(now)],
    )?;
    Ok(cleared)
}

/// Locked rows whose `modified` is older than `cutoff`, oldest first.
pub fn list_stale_locks(conn: &Connection, cutoff: DateTime<Utc>) -> DatabaseResult<Vec<StaleLock>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, send_retries, modified FROM email_queue
         WHERE locked = 1 AND modified < ?1
         ORDER BY modified ASC",
    )?;

    let rows = stmt
        .query_map(params![to_millis(cutoff)], |row| {
            Ok(StaleLock {
                id: row.get(0)?,
                send_retries: row.get(1)?,
                modified: from_millis(row.get(2)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ==========================================
// Stats
// ==========================================

/// Count rows by queue state.
pub fn queue_stats(conn: &Connection, retry_ceiling: u32, now: DateTime<Utc>) -> DatabaseResult<QueueStats> {
    let mut stmt = conn.prepare_cached(
        "SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN sent = 0 AND locked = 0 AND send_retries <= ?1 AND send_at <= ?2 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN sent = 0 AND locked = 0 AND send_retries <= ?1 AND send_at > ?2 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN locked = 1 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN sent = 1 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN sent = 0 AND send_retries > ?1 THEN 1 ELSE 0 END), 0)
         FROM email_queue",
    )?;

    let stats = stmt.query_row(params![retry_ceiling, to_millis(now)], |row| {
        Ok(QueueStats {
            total: row.get(0)?,
            ready: row.get(1)?,
            scheduled: row.get(2)?,
            locked: row.get(3)?,
            sent: row.get(4)?,
            exhausted: row.get(5)?,
        })
    })?;
    Ok(stats)
}

// ==========================================
// Helpers
// ==========================================

/// Map a row selected with [`ITEM_COLUMNS`].
pub fn map_item_row(row: &Row<'_>) -> rusqlite::Result<EmailQueueItem> {
    Ok(EmailQueueItem {
        id: row.get(0)?,
        to: Recipients::from_column(row.get::<_, Option<String>>(1)?.as_deref()).into_vec(),
        cc: Recipients::from_column(row.get::<_, Option<String>>(2)?.as_deref()).into_vec(),
        bcc: Recipients::from_column(row.get::<_, Option<String>>(3)?.as_deref()).into_vec(),
        reply_to: Recipients::from_column(row.get::<_, Option<String>>(4)?.as_deref()).into_vec(),
        from_email: row.get(5)?,
        from_name: row.get(6)?,
        subject: row.get(7)?,
        config: row.get(8)?,
        template: row.get(9)?,
        layout: row.get(10)?,
        theme: row.get(11)?,
        format: EmailFormat::from_str(&row.get::<_, String>(12)?),
        template_vars: parse_json_map(13, row.get(13)?)?,
        headers: parse_json_map(14, row.get(14)?)?,
        sent: row.get(15)?,
        locked: row.get(16)?,
        send_retries: row.get(17)?,
        send_at: from_millis(row.get(18)?),
        created: from_millis(row.get(19)?),
        modified: from_millis(row.get(20)?),
    })
}

fn parse_json_map(column: usize, raw: String) -> rusqlite::Result<JsonMap> {
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn placeholders(count: usize) -> String {
    std::iter::repeat("?")
        .take(count)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Run an UPDATE whose first parameter is a timestamp followed by an id list.
fn update_ids(conn: &Connection, sql: &str, now_ms: i64, ids: &[String]) -> DatabaseResult<usize> {
    let mut params_vec: Vec<&dyn ToSql> = Vec::with_capacity(ids.len() + 1);
    params_vec.push(&now_ms);
    for id in ids {
        params_vec.push(id);
    }
    Ok(conn.execute(sql, params_vec.as_slice())?)
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
