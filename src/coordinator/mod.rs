//! Extraction coordinator
//!
//! Server-side mutual exclusion for expensive per-chapter extraction jobs.
//!
//! # Lease protocol
//!
//! Coordination happens through a shared keyed-expiry store with SETNX
//! semantics. A lease (TTL-bounded lock) is preferred over a hard
//! distributed lock because it tolerates crashed holders without a
//! heartbeat protocol: if the holder dies mid-extraction the lock
//! self-expires and another caller may retry after the TTL elapses, which
//! bounds the worst-case staleness window.
//!
//! Lock contention is not an error. A caller that observes `Busy` waits
//! with bounded exponential backoff and re-reads the shared result store;
//! the active holder will have populated it. Only exhausting the wait
//! budget surfaces a retryable failure.

mod lease;
mod service;

pub use lease::{
    AcquireOutcome, KeyedExpiryStore, LeaseCoordinator, LeaseError, LeaseToken,
    MemoryExpiryStore, SqliteExpiryStore,
};
pub use service::{BackoffPolicy, DescriptionExtractor, ExtractError, ExtractionService};
