//! Prefetch scheduler
//!
//! Speculatively warms the local resource cache with the chapters a reader
//! is likely to open next.
//!
//! # Policy
//!
//! - Entering a chapter queues the next `window` chapters at `near` priority
//! - Tasks for chapters outside the sliding window are cancelled when the
//!   reader jumps elsewhere
//! - At most one task per chapter (idempotent scheduling), and at most one
//!   inflight prefetch overall: tasks share a single-permit semaphore, so
//!   they can never crowd out on-demand fetches, which bypass the
//!   scheduler entirely
//! - Failures are logged and swallowed; the chapter will be fetched
//!   on-demand if the reader actually reaches it

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::chapters::ChapterResourceManager;

/// Prefetch priority band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchPriority {
    /// Within the immediate reading window
    Near,
    /// Speculative, outside the immediate window
    Far,
}

/// Lifecycle state of a prefetch task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Inflight,
    Done,
    Cancelled,
}

/// A scheduled prefetch unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchTask {
    pub chapter_index: u32,
    pub priority: PrefetchPriority,
    pub state: TaskState,
}

/// Source of warm-up fetches
///
/// The chapter resource manager implements this; tests substitute
/// counting fetchers.
#[async_trait]
pub trait ChapterFetcher: Send + Sync {
    /// Whether the chapter is already resident in the cache
    fn is_warm(&self, chapter_index: u32) -> bool;

    /// Fetch and cache the chapter
    async fn warm(&self, chapter_index: u32) -> anyhow::Result<()>;
}

#[async_trait]
impl ChapterFetcher for ChapterResourceManager {
    fn is_warm(&self, chapter_index: u32) -> bool {
        self.is_ready(chapter_index)
    }

    async fn warm(&self, chapter_index: u32) -> anyhow::Result<()> {
        self.ensure_chapter_ready(chapter_index).await?;
        Ok(())
    }
}

struct TaskEntry {
    task: Arc<parking_lot::Mutex<PrefetchTask>>,
    join: JoinHandle<()>,
}

struct SchedulerInner {
    tasks: parking_lot::Mutex<HashMap<u32, TaskEntry>>,
    fetcher: Arc<dyn ChapterFetcher>,
    /// Single permit: prefetch work is strictly serialized
    permits: Arc<Semaphore>,
    window: u32,
}

/// Warms upcoming chapters into the cache at low priority
#[derive(Clone)]
pub struct PrefetchScheduler {
    inner: Arc<SchedulerInner>,
}

impl PrefetchScheduler {
    pub fn new(fetcher: Arc<dyn ChapterFetcher>, window: u32) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                tasks: parking_lot::Mutex::new(HashMap::new()),
                fetcher,
                permits: Arc::new(Semaphore::new(1)),
                window,
            }),
        }
    }

    /// React to the reader entering a chapter
    ///
    /// Queues the next `window` chapters and cancels any queued or inflight
    /// task that fell outside the new sliding window.
    pub fn on_chapter_enter(&self, chapter_index: u32) {
        let first = chapter_index.saturating_add(1);
        let last = chapter_index.saturating_add(self.inner.window);

        let mut tasks = self.inner.tasks.lock();

        // Cancel and prune everything outside the new window; without the
        // prune the map would grow with every chapter ever visited
        tasks.retain(|&chapter, entry| {
            if (first..=last).contains(&chapter) {
                return true;
            }
            let mut task = entry.task.lock();
            if matches!(task.state, TaskState::Queued | TaskState::Inflight) {
                entry.join.abort();
                task.state = TaskState::Cancelled;
                tracing::debug!("cancelled prefetch for chapter {}", chapter);
            }
            false
        });

        for chapter in first..=last {
            if self.inner.fetcher.is_warm(chapter) {
                continue;
            }
            if let Some(entry) = tasks.get(&chapter) {
                let state = entry.task.lock().state;
                if matches!(state, TaskState::Queued | TaskState::Inflight) {
                    // Already scheduled; idempotent
                    continue;
                }
            }

            let task = Arc::new(parking_lot::Mutex::new(PrefetchTask {
                chapter_index: chapter,
                priority: PrefetchPriority::Near,
                state: TaskState::Queued,
            }));

            let task_for_run = Arc::clone(&task);
            let fetcher = Arc::clone(&self.inner.fetcher);
            let permits = Arc::clone(&self.inner.permits);

            let join = tokio::spawn(async move {
                // Queued until a permit frees up; cancellation aborts here
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                task_for_run.lock().state = TaskState::Inflight;

                if let Err(e) = fetcher.warm(chapter).await {
                    tracing::debug!("prefetch for chapter {} failed: {}", chapter, e);
                }
                task_for_run.lock().state = TaskState::Done;
            });

            tasks.insert(chapter, TaskEntry { task, join });
        }
    }

    /// Snapshot of all known tasks, ordered by chapter
    pub fn task_states(&self) -> Vec<PrefetchTask> {
        let tasks = self.inner.tasks.lock();
        let mut states: Vec<PrefetchTask> = tasks.values().map(|e| *e.task.lock()).collect();
        states.sort_by_key(|t| t.chapter_index);
        states
    }

    /// Cancel everything outstanding (session teardown)
    pub fn cancel_all(&self) {
        let tasks = self.inner.tasks.lock();
        for entry in tasks.values() {
            let mut task = entry.task.lock();
            if matches!(task.state, TaskState::Queued | TaskState::Inflight) {
                entry.join.abort();
                task.state = TaskState::Cancelled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct MockFetcher {
        warm: parking_lot::Mutex<HashSet<u32>>,
        calls: parking_lot::Mutex<Vec<u32>>,
        concurrent: AtomicU32,
        max_concurrent: AtomicU32,
        delay: Duration,
        fail: bool,
    }

    impl MockFetcher {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                warm: parking_lot::Mutex::new(HashSet::new()),
                calls: parking_lot::Mutex::new(Vec::new()),
                concurrent: AtomicU32::new(0),
                max_concurrent: AtomicU32::new(0),
                delay,
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                warm: parking_lot::Mutex::new(HashSet::new()),
                calls: parking_lot::Mutex::new(Vec::new()),
                concurrent: AtomicU32::new(0),
                max_concurrent: AtomicU32::new(0),
                delay: Duration::ZERO,
                fail: true,
            })
        }

        fn calls(&self) -> Vec<u32> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl ChapterFetcher for MockFetcher {
        fn is_warm(&self, chapter_index: u32) -> bool {
            self.warm.lock().contains(&chapter_index)
        }

        async fn warm(&self, chapter_index: u32) -> anyhow::Result<()> {
            self.calls.lock().push(chapter_index);
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;
            self.concurrent.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                anyhow::bail!("network unreachable");
            }
            self.warm.lock().insert(chapter_index);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_schedules_next_window() {
        let fetcher = MockFetcher::new(Duration::ZERO);
        let scheduler = PrefetchScheduler::new(fetcher.clone(), 2);

        scheduler.on_chapter_enter(5);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(fetcher.calls(), vec![6, 7]);
        assert!(scheduler
            .task_states()
            .iter()
            .all(|t| t.state == TaskState::Done));
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_chapters_are_skipped() {
        let fetcher = MockFetcher::new(Duration::ZERO);
        fetcher.warm.lock().insert(6);
        let scheduler = PrefetchScheduler::new(fetcher.clone(), 2);

        scheduler.on_chapter_enter(5);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(fetcher.calls(), vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduling_is_idempotent() {
        let fetcher = MockFetcher::new(Duration::from_millis(100));
        let scheduler = PrefetchScheduler::new(fetcher.clone(), 2);

        scheduler.on_chapter_enter(5);
        scheduler.on_chapter_enter(5);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(fetcher.calls(), vec![6, 7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jump_cancels_and_prunes_tasks_outside_window() {
        let fetcher = MockFetcher::new(Duration::from_millis(200));
        let scheduler = PrefetchScheduler::new(fetcher.clone(), 2);

        scheduler.on_chapter_enter(0);
        // Jump far away before the queued tasks complete
        scheduler.on_chapter_enter(10);
        tokio::time::sleep(Duration::from_secs(2)).await;

        // The aborted tasks never finished warming and left no trace
        assert!(!fetcher.warm.lock().contains(&1));
        assert!(!fetcher.warm.lock().contains(&2));

        let states = scheduler.task_states();
        let chapters: Vec<u32> = states.iter().map(|t| t.chapter_index).collect();
        assert_eq!(chapters, vec![11, 12], "states: {:?}", states);
        assert!(states.iter().all(|t| t.state == TaskState::Done));
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_map_stays_bounded_across_visits() {
        let fetcher = MockFetcher::new(Duration::ZERO);
        let scheduler = PrefetchScheduler::new(fetcher.clone(), 2);

        for chapter in 0..50 {
            scheduler.on_chapter_enter(chapter);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Only the current window survives a long reading run
        assert!(scheduler.task_states().len() <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefetch_is_serialized() {
        let fetcher = MockFetcher::new(Duration::from_millis(50));
        let scheduler = PrefetchScheduler::new(fetcher.clone(), 3);

        scheduler.on_chapter_enter(0);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(fetcher.calls().len(), 3);
        assert_eq!(fetcher.max_concurrent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_silent_and_rescheduable() {
        let fetcher = MockFetcher::failing();
        let scheduler = PrefetchScheduler::new(fetcher.clone(), 1);

        scheduler.on_chapter_enter(3);
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Attempt finished; nothing warm, nothing panicked
        assert_eq!(fetcher.calls(), vec![4]);
        assert_eq!(scheduler.task_states()[0].state, TaskState::Done);

        // Re-entering the chapter tries again
        scheduler.on_chapter_enter(3);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fetcher.calls(), vec![4, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_stops_outstanding_work() {
        let fetcher = MockFetcher::new(Duration::from_millis(500));
        let scheduler = PrefetchScheduler::new(fetcher.clone(), 2);

        scheduler.on_chapter_enter(0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        scheduler.cancel_all();
        tokio::time::sleep(Duration::from_secs(2)).await;

        // First task started, second never ran to completion
        let states = scheduler.task_states();
        assert!(states.iter().any(|t| t.state == TaskState::Cancelled));
        assert!(fetcher.warm.lock().is_empty());
    }
}
