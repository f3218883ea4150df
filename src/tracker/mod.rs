//! Position tracker
//!
//! Owns the reader's current position and reconciles rendering-engine
//! relocation events into portable positions.
//!
//! # State machine
//!
//! ```text
//! Uninitialized --begin_restore--> Restoring --quiet window--> Tracking
//!                     │                                            ^
//!                     └---- degraded decode (fall back) -----------┘
//! ```
//!
//! The rendering engine emits a burst of transient `relocated` events while
//! jumping to a saved position. Reacting to each intermediate event would
//! mis-trigger chapter loads, so all downstream side effects are suppressed
//! until the final location is confirmed: no further relocation within a
//! short quiet window. A degraded decode (anchor gone, document rebuilt)
//! skips the wait entirely and starts tracking from the fallback location,
//! so restoration can never block the reader.
//!
//! The tracker itself performs no IO. Each event returns [`TrackerEffect`]s
//! that the owning session dispatches to the sync writer and the chapter
//! resource manager.

use std::time::Duration;

use tokio::time::Instant;

use crate::locator::{decode, encode, AnchorResolver, LiveLocation, Position};

/// Tracker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// No restore attempted yet
    Uninitialized,
    /// Jumping to a saved position; side effects suppressed
    Restoring,
    /// Normal operation; relocations produce effects
    Tracking,
}

/// Side effect requested by the tracker, dispatched by the owning session
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEffect {
    /// Persist this position (via the debounced sync writer)
    SyncPosition(Position),
    /// The reader entered a chapter; load its resources and warm neighbors
    ChapterEntered(u32),
}

/// Outcome of starting a restore
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreOutcome {
    /// Where the rendering engine should jump to
    pub target: LiveLocation,
    /// True if the saved anchor could not be resolved exactly
    pub degraded: bool,
    /// Effects to dispatch immediately (non-empty only when the quiet
    /// window was skipped)
    pub effects: Vec<TrackerEffect>,
}

/// Reconciles relocation events into positions and chapter-entry effects
pub struct PositionTracker {
    state: TrackerState,
    quiet_window: Duration,
    current: Option<LiveLocation>,
    position: Option<Position>,
    last_relocation: Option<Instant>,
}

impl PositionTracker {
    pub fn new(quiet_window: Duration) -> Self {
        Self {
            state: TrackerState::Uninitialized,
            quiet_window,
            current: None,
            position: None,
            last_relocation: None,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Latest known position, if any
    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// Progress through the book as a fraction of 100
    pub fn progress_percent(&self) -> f64 {
        self.position.as_ref().map_or(0.0, |p| p.progress_percent)
    }

    /// Begin restoring a saved position
    ///
    /// With no saved position the reader starts at the top of the book and
    /// tracking begins immediately. A degraded decode also starts tracking
    /// immediately from the fallback location. Otherwise the tracker enters
    /// `Restoring` and waits out the relocation burst.
    pub fn begin_restore(
        &mut self,
        saved: Option<&Position>,
        resolver: &dyn AnchorResolver,
    ) -> RestoreOutcome {
        match saved {
            None => {
                let target = LiveLocation::chapter_start(0);
                self.enter_tracking(target);
                RestoreOutcome {
                    target,
                    degraded: false,
                    effects: vec![TrackerEffect::ChapterEntered(0)],
                }
            }
            Some(position) => {
                let decoded = decode(position, resolver);
                let target = decoded.location;

                if decoded.degraded {
                    self.enter_tracking(target);
                    RestoreOutcome {
                        target,
                        degraded: true,
                        effects: vec![TrackerEffect::ChapterEntered(target.chapter_index)],
                    }
                } else {
                    self.state = TrackerState::Restoring;
                    self.current = Some(target);
                    self.position = Some(encode(&target));
                    self.last_relocation = None;
                    RestoreOutcome {
                        target,
                        degraded: false,
                        effects: Vec::new(),
                    }
                }
            }
        }
    }

    /// Handle a `relocated` event from the rendering engine
    ///
    /// Events are applied in arrival order. During `Restoring` the location
    /// is recorded but no effects are produced; the caller should re-arm its
    /// quiet-window timer and call [`on_quiet_elapsed`](Self::on_quiet_elapsed)
    /// when it fires.
    pub fn on_relocated(&mut self, live: LiveLocation) -> Vec<TrackerEffect> {
        match self.state {
            TrackerState::Uninitialized => {
                tracing::warn!("relocation event before restore; ignoring");
                Vec::new()
            }
            TrackerState::Restoring => {
                self.current = Some(live);
                self.position = Some(encode(&live));
                self.last_relocation = Some(Instant::now());
                Vec::new()
            }
            TrackerState::Tracking => {
                let previous_chapter = self.current.map(|c| c.chapter_index);
                let position = encode(&live);
                self.current = Some(live);
                self.position = Some(position.clone());

                let mut effects = Vec::new();
                if previous_chapter != Some(live.chapter_index) {
                    effects.push(TrackerEffect::ChapterEntered(live.chapter_index));
                }
                effects.push(TrackerEffect::SyncPosition(position));
                effects
            }
        }
    }

    /// Handle the quiet-window timer firing
    ///
    /// Completes `Restoring -> Tracking` once no relocation has arrived for
    /// a full quiet window. A timer that fires with no relocation recorded
    /// at all (the engine settled silently, or the process restarted
    /// mid-restore) also counts as settled: the last decoded location wins
    /// rather than hanging the reader.
    pub fn on_quiet_elapsed(&mut self) -> Vec<TrackerEffect> {
        if self.state != TrackerState::Restoring {
            return Vec::new();
        }

        if let Some(last) = self.last_relocation {
            if last.elapsed() < self.quiet_window {
                // Another burst arrived; caller re-arms the timer
                return Vec::new();
            }
        }

        self.state = TrackerState::Tracking;
        match self.current {
            Some(live) => vec![TrackerEffect::ChapterEntered(live.chapter_index)],
            None => Vec::new(),
        }
    }

    fn enter_tracking(&mut self, live: LiveLocation) {
        self.state = TrackerState::Tracking;
        self.current = Some(live);
        self.position = Some(encode(&live));
        self.last_relocation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::Locator;

    struct FixedResolver {
        chapters: Vec<u32>,
    }

    impl AnchorResolver for FixedResolver {
        fn chapter_count(&self) -> u32 {
            self.chapters.len() as u32
        }

        fn paragraph_count(&self, chapter: u32) -> Option<u32> {
            self.chapters.get(chapter as usize).copied()
        }
    }

    fn resolver() -> FixedResolver {
        FixedResolver {
            chapters: vec![20; 10],
        }
    }

    fn live(chapter: u32, paragraph: u32) -> LiveLocation {
        LiveLocation {
            chapter_index: chapter,
            paragraph_index: paragraph,
            char_offset: 0,
            scroll_offset: 0.0,
            progress_percent: 10.0 * chapter as f64,
        }
    }

    fn saved(chapter: u32, paragraph: u32) -> Position {
        Position {
            locator: Locator {
                chapter,
                paragraph,
                offset: 0,
            }
            .to_string(),
            scroll_offset: 0.2,
            chapter_index: chapter,
            progress_percent: 50.0,
        }
    }

    const QUIET: Duration = Duration::from_millis(500);

    #[test]
    fn test_fresh_start_tracks_immediately() {
        let mut tracker = PositionTracker::new(QUIET);
        let outcome = tracker.begin_restore(None, &resolver());

        assert_eq!(tracker.state(), TrackerState::Tracking);
        assert_eq!(outcome.target, LiveLocation::chapter_start(0));
        assert_eq!(outcome.effects, vec![TrackerEffect::ChapterEntered(0)]);
    }

    #[test]
    fn test_restore_suppresses_burst_side_effects() {
        let mut tracker = PositionTracker::new(QUIET);
        let outcome = tracker.begin_restore(Some(&saved(5, 12)), &resolver());

        assert_eq!(tracker.state(), TrackerState::Restoring);
        assert!(outcome.effects.is_empty());

        // Transient relocation burst while the engine jumps around
        assert!(tracker.on_relocated(live(0, 0)).is_empty());
        assert!(tracker.on_relocated(live(3, 8)).is_empty());
        assert!(tracker.on_relocated(live(5, 12)).is_empty());
        assert_eq!(tracker.state(), TrackerState::Restoring);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_window_completes_restore() {
        let mut tracker = PositionTracker::new(QUIET);
        tracker.begin_restore(Some(&saved(5, 12)), &resolver());
        tracker.on_relocated(live(5, 12));

        // Timer fires too early: another relocation just arrived
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(tracker.on_quiet_elapsed().is_empty());
        assert_eq!(tracker.state(), TrackerState::Restoring);

        // Full quiet window with no events: settled
        tokio::time::advance(QUIET).await;
        let effects = tracker.on_quiet_elapsed();
        assert_eq!(effects, vec![TrackerEffect::ChapterEntered(5)]);
        assert_eq!(tracker.state(), TrackerState::Tracking);
    }

    #[test]
    fn test_degraded_decode_skips_restore_wait() {
        // Saved position points past the end of the spine
        let mut tracker = PositionTracker::new(QUIET);
        let outcome = tracker.begin_restore(Some(&saved(99, 0)), &resolver());

        assert!(outcome.degraded);
        assert_eq!(tracker.state(), TrackerState::Tracking);
        assert_eq!(outcome.effects, vec![TrackerEffect::ChapterEntered(9)]);
    }

    #[test]
    fn test_restart_mid_restore_still_settles() {
        // Process restarted before the engine emitted a single relocation:
        // the quiet timer fires with no recorded events and tracking starts
        // from the decoded target.
        let mut tracker = PositionTracker::new(QUIET);
        tracker.begin_restore(Some(&saved(4, 2)), &resolver());

        let effects = tracker.on_quiet_elapsed();
        assert_eq!(effects, vec![TrackerEffect::ChapterEntered(4)]);
        assert_eq!(tracker.state(), TrackerState::Tracking);
        assert_eq!(tracker.position().unwrap().chapter_index, 4);
    }

    #[test]
    fn test_tracking_emits_sync_on_each_relocation() {
        let mut tracker = PositionTracker::new(QUIET);
        tracker.begin_restore(None, &resolver());

        let effects = tracker.on_relocated(live(0, 3));
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], TrackerEffect::SyncPosition(_)));

        let effects = tracker.on_relocated(live(0, 4));
        assert_eq!(effects.len(), 1);
        assert_eq!(tracker.position().unwrap().locator, "loc(/0/4:0)");
    }

    #[test]
    fn test_chapter_change_emits_chapter_entered() {
        let mut tracker = PositionTracker::new(QUIET);
        tracker.begin_restore(None, &resolver());
        tracker.on_relocated(live(0, 19));

        let effects = tracker.on_relocated(live(1, 0));
        assert_eq!(effects[0], TrackerEffect::ChapterEntered(1));
        assert!(matches!(effects[1], TrackerEffect::SyncPosition(_)));
    }

    #[test]
    fn test_relocation_before_restore_is_ignored() {
        let mut tracker = PositionTracker::new(QUIET);
        assert!(tracker.on_relocated(live(2, 2)).is_empty());
        assert_eq!(tracker.state(), TrackerState::Uninitialized);
    }
}
