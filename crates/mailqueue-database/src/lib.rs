//! SQLite-backed email queue store.
//!
//! This crate provides:
//! - Async SQLite executor with a dedicated thread per connection
//! - Schema migrations for the `email_queue` table
//! - Model types for queue items and enqueue options
//! - The atomic batch-claim dispatcher
//! - [`QueueStore`], the only component that mutates queue rows
//!
//! # Example
//!
//! ```ignore
//! let store = QueueStore::open(&path).await?;
//! let id = store
//!     .enqueue(EmailRecipients::to("a@example.com"), vars, EnqueueOptions::default())
//!     .await?;
//! let batch = store.claim_batch(50).await?;
//! ```

mod clock;
pub mod dispatcher;
mod error;
mod executor;
mod migrations;
mod models;
pub mod queries;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::{ClaimRequest, RETRY_CEILING};
pub use error::{DatabaseError, DatabaseResult};
pub use executor::AsyncDatabase;
pub use migrations::run_migrations;
pub use models::*;
pub use store::QueueStore;
