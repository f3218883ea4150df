//! Progress synchronization
//!
//! Provides:
//! - Debounced, race-free persistence of reading positions
//! - A transport-agnostic progress sink with an HTTP implementation
//! - Monotonic client timestamps for server-side last-write-wins
//!
//! # Write protocol
//!
//! 1. Every settled relocation enqueues a position
//! 2. Rapid updates coalesce; one persistence call per burst, carrying the
//!    last position of the burst
//! 3. Teardown and process-termination hooks force a flush so nothing is
//!    silently dropped
//! 4. Each payload carries a monotonic `client_ts`; the server keeps only
//!    strictly newer writes, so concurrent tabs need no client-side locking

mod sink;
mod writer;

pub use sink::{HttpProgressSink, ProgressSink, ProgressWrite, SyncError};
pub use writer::{DebouncedSyncWriter, MonotonicClock};
