//! Database migrations.
//!
//! Migrations are applied in order inside one `BEGIN IMMEDIATE` transaction
//! and tracked in the `migrations` table, so workers starting at the same
//! time against a fresh file don't race each other.

use crate::{DatabaseError, DatabaseResult};
use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations.
pub fn run_migrations(conn: &mut Connection) -> DatabaseResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    tx.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = tx.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version > CURRENT_VERSION {
        return Err(DatabaseError::Migration(format!(
            "database schema v{} is newer than this build (v{})",
            current_version, CURRENT_VERSION
        )));
    }

    if current_version < CURRENT_VERSION {
        info!(current_version, target_version = CURRENT_VERSION, "Running migrations");
    }

    if current_version < 1 {
        migrate_v1_email_queue(&tx)?;
    }

    tx.commit()?;
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: the email queue table.
///
/// Timestamps are integer milliseconds since the Unix epoch. Recipient lists
/// are comma-delimited; `template_vars` and `headers` hold JSON objects.
fn migrate_v1_email_queue(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: email queue");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS email_queue (
            id TEXT PRIMARY KEY,
            email_to TEXT NOT NULL,
            email_cc TEXT,
            email_bcc TEXT,
            email_reply_to TEXT,
            from_email TEXT,
            from_name TEXT,
            subject TEXT NOT NULL DEFAULT '',
            config TEXT NOT NULL DEFAULT 'default',
            template TEXT NOT NULL DEFAULT 'default',
            layout TEXT NOT NULL DEFAULT 'default',
            theme TEXT NOT NULL DEFAULT '',
            format TEXT NOT NULL DEFAULT 'both',
            template_vars TEXT NOT NULL DEFAULT '{}',
            headers TEXT NOT NULL DEFAULT '{}',
            sent INTEGER NOT NULL DEFAULT 0,
            locked INTEGER NOT NULL DEFAULT 0,
            send_retries INTEGER NOT NULL DEFAULT 0,
            send_at INTEGER NOT NULL,
            created INTEGER NOT NULL,
            modified INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_email_queue_claim
            ON email_queue(sent, locked, send_at, created);
        CREATE INDEX IF NOT EXISTS idx_email_queue_locked_modified
            ON email_queue(locked, modified);
        ",
    )?;

    record_migration(conn, 1, "email_queue")?;
    Ok(())
}
