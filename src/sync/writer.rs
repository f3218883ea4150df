//! Debounced sync writer
//!
//! Batches position updates into infrequent persistence calls. Only the
//! latest position within a quiet window survives; a burst of navigation
//! events produces exactly one persistence call after the burst ends.
//!
//! # Guarantees
//!
//! - No position is silently dropped: it is either superseded by a strictly
//!   newer one before its window elapses, or flushed
//! - `flush_now` persists the pending position immediately (teardown)
//! - `flush_detached` fires a best-effort attempt without awaiting it
//!   (process about to terminate)
//! - Every payload carries a monotonic `client_ts` so concurrent tabs
//!   resolve to last-write-wins on the server, with no client locking

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::locator::Position;

use super::sink::{persist_with_retry, ProgressSink, ProgressWrite, SyncError};

/// Retry attempts for an awaited flush
const FLUSH_RETRY_ATTEMPTS: u32 = 3;

/// Millisecond wall-clock timestamps that never repeat or go backwards
///
/// Two updates landing in the same millisecond (or a wall clock stepping
/// back) would otherwise produce equal timestamps and the server's
/// strictly-newer comparison would drop the later write.
pub struct MonotonicClock {
    last: parking_lot::Mutex<i64>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            last: parking_lot::Mutex::new(0),
        }
    }

    pub fn now_ms(&self) -> i64 {
        let wall = Utc::now().timestamp_millis();
        let mut last = self.last.lock();
        let ts = wall.max(*last + 1);
        *last = ts;
        ts
    }

    /// Raise the floor so future stamps stay strictly ahead of `ts`
    ///
    /// Used when resuming over persisted timestamps that may be at or ahead
    /// of the current wall clock.
    pub fn advance_to(&self, ts: i64) {
        let mut last = self.last.lock();
        *last = (*last).max(ts);
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

struct Pending {
    write: Option<ProgressWrite>,
    seq: u64,
}

struct WriterShared {
    pending: parking_lot::Mutex<Pending>,
    notify: Notify,
    delay: Duration,
    sink: Arc<dyn ProgressSink>,
    clock: MonotonicClock,
    book_id: String,
    device_id: Option<String>,
}

/// Debounced, flush-on-teardown position writer
pub struct DebouncedSyncWriter {
    shared: Arc<WriterShared>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl DebouncedSyncWriter {
    /// Create a writer and start its debounce task
    pub fn new(
        book_id: impl Into<String>,
        device_id: Option<String>,
        sink: Arc<dyn ProgressSink>,
        delay: Duration,
    ) -> Self {
        let shared = Arc::new(WriterShared {
            pending: parking_lot::Mutex::new(Pending {
                write: None,
                seq: 0,
            }),
            notify: Notify::new(),
            delay,
            sink,
            clock: MonotonicClock::new(),
            book_id: book_id.into(),
            device_id,
        });

        let task = tokio::spawn(debounce_loop(Arc::clone(&shared)));

        Self {
            shared,
            task: parking_lot::Mutex::new(Some(task)),
        }
    }

    /// Queue a position for persistence, superseding any pending one
    pub fn enqueue(&self, position: &Position) {
        let write = ProgressWrite {
            book_id: self.shared.book_id.clone(),
            locator: position.locator.clone(),
            scroll_offset: position.scroll_offset,
            chapter_index: position.chapter_index,
            progress_percent: position.progress_percent,
            client_ts: self.shared.clock.now_ms(),
            device_id: self.shared.device_id.clone(),
        };

        {
            let mut pending = self.shared.pending.lock();
            pending.write = Some(write);
            pending.seq += 1;
        }
        self.shared.notify.notify_one();
    }

    /// Persist the pending position immediately, with retries
    ///
    /// No-op when nothing is pending. Called on session teardown.
    pub async fn flush_now(&self) -> Result<(), SyncError> {
        let write = self.shared.pending.lock().write.take();
        match write {
            Some(w) => persist_with_retry(&*self.shared.sink, &w, FLUSH_RETRY_ATTEMPTS).await,
            None => Ok(()),
        }
    }

    /// Fire a best-effort flush without awaiting the result
    ///
    /// For the process-termination hook, where there is no time to await an
    /// acknowledgement; the attempt itself is guaranteed to be made.
    pub fn flush_detached(&self) {
        let write = self.shared.pending.lock().write.take();
        if let Some(w) = write {
            let sink = Arc::clone(&self.shared.sink);
            tokio::spawn(async move {
                if let Err(e) = sink.persist(&w).await {
                    tracing::warn!("detached progress flush failed: {}", e);
                }
            });
        }
    }

    /// Flush and stop the debounce task
    pub async fn shutdown(&self) -> Result<(), SyncError> {
        let result = self.flush_now().await;
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        result
    }
}

impl Drop for DebouncedSyncWriter {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

async fn debounce_loop(shared: Arc<WriterShared>) {
    loop {
        shared.notify.notified().await;

        loop {
            let seq = shared.pending.lock().seq;
            tokio::time::sleep(shared.delay).await;

            let write = {
                let mut pending = shared.pending.lock();
                if pending.seq == seq {
                    pending.write.take()
                } else {
                    None
                }
            };

            if let Some(w) = write {
                if let Err(e) =
                    persist_with_retry(&*shared.sink, &w, FLUSH_RETRY_ATTEMPTS).await
                {
                    tracing::error!("progress persist failed after retries: {}", e);
                }
                break;
            }

            // Either a newer enqueue restarted the window, or a flush
            // already took the payload
            if shared.pending.lock().write.is_none() {
                break;
            }
        }
    }
}
