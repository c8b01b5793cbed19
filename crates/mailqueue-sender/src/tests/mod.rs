//! Integration tests for the claim/lock/retry protocol.
//!
//! - `harness.rs`   - Mock transport and on-disk queue with a manual clock
//! - `claim.rs`     - Claim atomicity, FIFO order, eligibility filter
//! - `delivery.rs`  - Worker cycles: lock release, retries, timeouts, resolution
//! - `scenarios.rs` - Deferred send, retry-then-succeed, crash recovery

mod delivery;
