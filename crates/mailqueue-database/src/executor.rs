//! Async SQLite executor using a dedicated background thread.
//!
//! Each [`AsyncDatabase`] owns one SQLite connection living on its own
//! thread. Closures passed to [`AsyncDatabase::call`] run there in FIFO order
//! while the calling task is parked, so the Tokio runtime never blocks on
//! SQLite.
//!
//! Only SQL and lightweight row mapping belong inside `call()`. Network I/O
//! (the transport) must happen outside, or it stalls every other query on
//! the connection.
//!
//! Several workers that share one database file each open their own
//! `AsyncDatabase`; SQLite's file locking (WAL + busy timeout) arbitrates
//! between them.

use crate::{migrations, DatabaseError, DatabaseResult};
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

// busy_timeout goes first so the journal_mode switch can wait out other writers
const FILE_PRAGMAS: &str = "
    PRAGMA busy_timeout = 5000;
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA temp_store = MEMORY;
";

// WAL doesn't apply to in-memory databases
const MEMORY_PRAGMAS: &str = "
    PRAGMA temp_store = MEMORY;
";

/// Convert a tokio_rusqlite::Error to DatabaseError.
fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> DatabaseError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => DatabaseError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => DatabaseError::Connection("Connection closed".to_string()),
        other => DatabaseError::Connection(other.to_string()),
    }
}

/// Async SQLite database with a dedicated executor thread.
#[derive(Clone)]
pub struct AsyncDatabase {
    conn: Connection,
    path: String,
}

impl AsyncDatabase {
    /// Open a database at the given path.
    ///
    /// This will:
    /// - Create the parent directory and database file if missing
    /// - Enable WAL mode and a busy timeout for multi-process access
    /// - Run any pending migrations
    pub async fn open(path: &Path) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let path_str = path.to_string_lossy().to_string();
        info!(path = %path_str, "Opening queue database");

        let conn = Connection::open(path)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        let db = Self {
            conn,
            path: path_str,
        };
        db.initialize(FILE_PRAGMAS).await?;

        info!(path = %db.path, "Queue database initialized with WAL mode");
        Ok(db)
    }

    /// Open a private in-memory database, mostly for tests.
    pub async fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        let db = Self {
            conn,
            path: ":memory:".to_string(),
        };
        db.initialize(MEMORY_PRAGMAS).await?;
        Ok(db)
    }

    async fn initialize(&self, pragmas: &'static str) -> DatabaseResult<()> {
        self.call_sqlite(move |conn| conn.execute_batch(pragmas))
            .await?;
        self.call(|conn| migrations::run_migrations(conn)).await
    }

    /// Execute a closure on the database connection.
    ///
    /// The closure runs on the dedicated SQLite thread and receives the
    /// connection mutably so it can open transactions.
    pub async fn call<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> DatabaseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        // Our DatabaseResult rides inside tokio_rusqlite's Ok variant so that
        // validation and JSON errors survive the trip back unchanged.
        let outer_result = self
            .conn
            .call(move |conn| Ok(f(conn)))
            .await;

        match outer_result {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// Execute a closure that returns a rusqlite::Result.
    pub async fn call_sqlite<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(move |conn| Ok(f(conn)?))
            .await
            .map_err(from_tokio_rusqlite)
    }

    /// Get the database file path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check if the database is healthy by executing a simple query.
    pub async fn health_check(&self) -> DatabaseResult<()> {
        self.call_sqlite(|conn| conn.execute_batch("SELECT 1"))
            .await?;
        debug!("Database health check passed");
        Ok(())
    }

    /// Close the database connection after pending calls finish.
    pub async fn close(self) -> DatabaseResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to close database: {:?}", e)))?;
        info!(path = %self.path, "Database closed");
        Ok(())
    }
}
