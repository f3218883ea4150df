//! Reader session
//!
//! Composition root for one open book: wires the position tracker, the
//! debounced sync writer, the chapter resource manager, and the prefetch
//! scheduler together and dispatches tracker effects between them.
//!
//! Every collaborator is injected, so tests (and alternative frontends)
//! can assemble a session from substitutes.
//!
//! # Lifecycle
//!
//! - [`start`](ReaderSession::start) restores the saved position and arms
//!   the quiet-window timer when the restore needs to settle
//! - [`on_relocated`](ReaderSession::on_relocated) feeds rendering-engine
//!   events through the tracker; resulting effects go to the writer
//!   (position sync) and the manager/scheduler (chapter loads)
//! - [`teardown`](ReaderSession::teardown) flushes pending progress and
//!   cancels outstanding prefetches
//! - [`on_before_terminate`](ReaderSession::on_before_terminate) fires the
//!   best-effort detached flush for abrupt process exits

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{DurableStore, ResourceCache};
use crate::chapters::{ChapterResourceManager, ExtractionBackend};
use crate::config::Config;
use crate::locator::{AnchorResolver, LiveLocation, Position};
use crate::prefetch::PrefetchScheduler;
use crate::sync::{DebouncedSyncWriter, ProgressSink, SyncError};
use crate::tracker::{PositionTracker, RestoreOutcome, TrackerEffect, TrackerState};

struct SessionInner {
    tracker: parking_lot::Mutex<PositionTracker>,
    writer: DebouncedSyncWriter,
    manager: ChapterResourceManager,
    scheduler: PrefetchScheduler,
    quiet_window: Duration,
}

/// One reader's live session over a single book
#[derive(Clone)]
pub struct ReaderSession {
    inner: Arc<SessionInner>,
}

impl ReaderSession {
    pub fn new(
        writer: DebouncedSyncWriter,
        manager: ChapterResourceManager,
        scheduler: PrefetchScheduler,
        quiet_window: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                tracker: parking_lot::Mutex::new(PositionTracker::new(quiet_window)),
                writer,
                manager,
                scheduler,
                quiet_window,
            }),
        }
    }

    pub fn state(&self) -> TrackerState {
        self.inner.tracker.lock().state()
    }

    pub fn position(&self) -> Option<Position> {
        self.inner.tracker.lock().position().cloned()
    }

    /// Open the book, restoring `saved` if present
    ///
    /// Returns where the rendering engine should jump to. When the restore
    /// enters the settling phase the quiet-window timer is armed here.
    pub fn start(
        &self,
        saved: Option<&Position>,
        resolver: &dyn AnchorResolver,
    ) -> RestoreOutcome {
        let outcome = {
            let mut tracker = self.inner.tracker.lock();
            tracker.begin_restore(saved, resolver)
        };

        self.dispatch(outcome.effects.clone());
        if self.state() == TrackerState::Restoring {
            self.arm_quiet_timer();
        }
        outcome
    }

    /// Feed a relocation event from the rendering engine
    pub fn on_relocated(&self, live: LiveLocation) {
        let effects = self.inner.tracker.lock().on_relocated(live);
        self.dispatch(effects);
    }

    /// Flush progress and cancel outstanding work (book closed)
    pub async fn teardown(&self) -> Result<(), SyncError> {
        self.inner.scheduler.cancel_all();
        self.inner.writer.shutdown().await
    }

    /// Best-effort flush for process termination; does not await
    pub fn on_before_terminate(&self) {
        self.inner.writer.flush_detached();
    }

    fn arm_quiet_timer(&self) {
        let session = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(session.inner.quiet_window).await;

                let (effects, settled) = {
                    let mut tracker = session.inner.tracker.lock();
                    let effects = tracker.on_quiet_elapsed();
                    (effects, tracker.state() != TrackerState::Restoring)
                };
                session.dispatch(effects);
                if settled {
                    break;
                }
            }
        });
    }

    /// Assemble a session for one book from configuration
    ///
    /// Pulls the cache capacity, debounce delay, quiet window, and prefetch
    /// window from [`Config`]; the store, sink, and backend stay injectable.
    pub async fn open(
        config: &Config,
        book_id: &str,
        device_id: Option<String>,
        store: Arc<dyn DurableStore>,
        sink: Arc<dyn ProgressSink>,
        backend: Arc<dyn ExtractionBackend>,
    ) -> Self {
        let cache = ResourceCache::open(store, config.cache.capacity_bytes as u64).await;
        let manager = ChapterResourceManager::new(book_id, cache, backend);
        let scheduler =
            PrefetchScheduler::new(Arc::new(manager.clone()), config.reader.prefetch_window);
        let writer =
            DebouncedSyncWriter::new(book_id, device_id, sink, config.reader.sync_debounce());

        Self::new(writer, manager, scheduler, config.reader.restore_quiet_window())
    }

    fn dispatch(&self, effects: Vec<TrackerEffect>) {
        for effect in effects {
            match effect {
                TrackerEffect::SyncPosition(position) => {
                    self.inner.writer.enqueue(&position);
                }
                TrackerEffect::ChapterEntered(chapter_index) => {
                    // On-demand load never goes through the prefetch queue
                    let manager = self.inner.manager.clone();
                    tokio::spawn(async move {
                        if let Err(e) = manager.ensure_chapter_ready(chapter_index).await {
                            tracing::debug!("chapter {} load failed: {}", chapter_index, e);
                        }
                    });
                    self.inner.scheduler.on_chapter_enter(chapter_index);
                }
            }
        }
    }
}
