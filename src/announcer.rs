//! "Now calling" display loop
//!
//! The announcer owns a [`CallSequencer`] and drains it into a [`Screen`],
//! one call per dwell period. At most one drain loop runs at a time: a
//! [`LoopGuard`] is claimed by whoever finds work while no loop is running,
//! and released by the loop itself when it finds the queue empty. Both
//! transitions happen under the same lock as the queue, so an ingest racing
//! the final pop either feeds the live loop or starts exactly one new one.
//!
//! When the queue drains the last call stays on screen; the next ingest that
//! brings unseen calls starts a fresh loop.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::health::HealthMetrics;
use crate::model::CallRecord;
use crate::screen::Screen;
use crate::sequencer::CallSequencer;

/// Single "is running" flag for the drain loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LoopGuard {
    running: bool,
}

impl LoopGuard {
    /// Returns true when the caller must start the loop
    pub fn claim(&mut self, has_work: bool) -> bool {
        if has_work && !self.running {
            self.running = true;
            true
        } else {
            false
        }
    }

    /// The loop found nothing left to show
    pub fn release(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

#[derive(Debug, Default)]
struct State {
    sequencer: CallSequencer,
    guard: LoopGuard,
    /// Last call put on screen; stays visible while idle
    current: Option<CallRecord>,
    loops_started: u64,
}

struct Inner {
    state: Mutex<State>,
    screen: Arc<dyn Screen>,
    metrics: Arc<HealthMetrics>,
    dwell: Duration,
    cancel: CancellationToken,
    idle: Notify,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pop the next call, or release the guard if there is none
    fn advance(&self) -> Option<CallRecord> {
        let mut state = self.lock();
        match state.sequencer.pop() {
            Some(record) => {
                state.current = Some(record.clone());
                Some(record)
            }
            None => {
                state.guard.release();
                None
            }
        }
    }

    fn stop_loop(&self) {
        self.lock().guard.release();
        self.idle.notify_waiters();
    }

    async fn run(self: Arc<Self>) {
        debug!("Announcement loop started");

        loop {
            if self.cancel.is_cancelled() {
                self.stop_loop();
                return;
            }

            let Some(record) = self.advance() else {
                debug!("Announcement queue drained, holding last call on screen");
                self.idle.notify_waiters();
                return;
            };

            info!("Now calling {}", record.display_code);
            self.screen.show_call(&record);
            self.metrics.record_announcement();

            tokio::select! {
                _ = tokio::time::sleep(self.dwell) => {}
                _ = self.cancel.cancelled() => {
                    debug!("Announcement loop cancelled");
                    self.stop_loop();
                    return;
                }
            }
        }
    }
}

/// Cloneable handle; all clones share one queue and one loop
#[derive(Clone)]
pub struct Announcer {
    inner: Arc<Inner>,
}

impl Announcer {
    pub fn new(screen: Arc<dyn Screen>, metrics: Arc<HealthMetrics>, dwell: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                screen,
                metrics,
                dwell,
                cancel: CancellationToken::new(),
                idle: Notify::new(),
            }),
        }
    }

    /// Feed a newest-first snapshot; starts the loop if it is idle and
    /// there is something to show. Returns the number of new calls.
    ///
    /// Must be called from within a tokio runtime.
    pub fn ingest(&self, snapshot: &[CallRecord]) -> usize {
        if self.inner.cancel.is_cancelled() {
            return 0;
        }

        let (added, start) = {
            let mut state = self.inner.lock();
            let added = state.sequencer.ingest(snapshot);
            let has_work = !state.sequencer.is_empty();
            let start = state.guard.claim(has_work);
            if start {
                state.loops_started += 1;
            }
            (added, start)
        };

        if start {
            tokio::spawn(self.inner.clone().run());
        }

        added
    }

    /// Cancel the loop; later ingests are ignored
    pub fn stop(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().guard.is_running()
    }

    /// Calls queued but not yet shown
    pub fn pending(&self) -> usize {
        self.inner.lock().sequencer.pending()
    }

    /// Distinct calls seen this session
    pub fn seen(&self) -> usize {
        self.inner.lock().sequencer.seen()
    }

    /// Call currently (or last) on screen
    pub fn current(&self) -> Option<CallRecord> {
        self.inner.lock().current.clone()
    }

    /// How many times a drain loop has been started
    pub fn loops_started(&self) -> u64 {
        self.inner.lock().loops_started
    }

    /// Wait until no loop is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use tokio::time::sleep;

    const DWELL: Duration = Duration::from_secs(5);

    fn announcer() -> (Announcer, Arc<RecordingScreen>, Arc<HealthMetrics>) {
        let screen = Arc::new(RecordingScreen::default());
        let metrics = Arc::new(HealthMetrics::new());
        let announcer = Announcer::new(screen.clone(), metrics.clone(), DWELL);
        (announcer, screen, metrics)
    }

    /// Let spawned tasks run without crossing a dwell boundary
    async fn settle() {
        sleep(Duration::from_millis(10)).await;
    }

    #[test]
    fn test_guard_claim_release() {
        let mut guard = LoopGuard::default();
        assert!(!guard.claim(false));
        assert!(guard.claim(true));
        assert!(!guard.claim(true), "second claim must not start another loop");
        assert!(guard.is_running());
        guard.release();
        assert!(guard.claim(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_shown_oldest_first() {
        let (announcer, screen, _) = announcer();
        announcer.ingest(&[call("C003"), call("C002"), call("C001")]);

        sleep(DWELL * 3 + Duration::from_millis(10)).await;
        assert_eq!(screen.calls(), ["C001", "C002", "C003"]);
        assert!(!announcer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_call_dwells_exactly() {
        let (announcer, screen, _) = announcer();
        announcer.ingest(&[call("C003"), call("C002"), call("C001")]);
        announcer.wait_idle().await;

        let times = screen.call_times();
        assert_eq!(times.len(), 3);
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], DWELL);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_snapshot_twice_shows_three() {
        let (announcer, screen, metrics) = announcer();
        let snapshot = [call("C003"), call("C002"), call("C001")];

        assert_eq!(announcer.ingest(&snapshot), 3);
        settle().await;
        assert_eq!(announcer.ingest(&snapshot), 0);

        announcer.wait_idle().await;
        // Rolling window re-sends the same calls after they were all shown
        assert_eq!(announcer.ingest(&snapshot), 0);
        settle().await;

        assert_eq!(screen.calls().len(), 3);
        assert_eq!(metrics.status().announcements, 3);
        assert_eq!(announcer.loops_started(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ingest_mid_display_appends_without_interrupting() {
        let (announcer, screen, _) = announcer();
        announcer.ingest(&[call("C002"), call("C001")]);
        settle().await;
        assert_eq!(screen.calls(), ["C001"]);

        // Halfway through C001's dwell a new poll brings C003
        sleep(Duration::from_secs(2)).await;
        announcer.ingest(&[call("C003"), call("C002"), call("C001")]);
        settle().await;
        assert_eq!(screen.calls(), ["C001"], "current call must not be interrupted");
        assert_eq!(announcer.pending(), 2);
        assert_eq!(announcer.loops_started(), 1, "no second loop");

        announcer.wait_idle().await;
        assert_eq!(screen.calls(), ["C001", "C002", "C003"]);

        let times = screen.call_times();
        assert_eq!(times[1] - times[0], DWELL);
        assert_eq!(times[2] - times[1], DWELL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_keeps_last_call_then_restarts() {
        let (announcer, screen, _) = announcer();
        announcer.ingest(&[call("C001")]);
        announcer.wait_idle().await;

        assert!(!announcer.is_running());
        assert_eq!(announcer.current().unwrap().display_code, "C001");
        assert!(!screen.events().contains(&Event::Idle));

        sleep(Duration::from_secs(30)).await;
        assert_eq!(announcer.current().unwrap().display_code, "C001");

        announcer.ingest(&[call("C002"), call("C001")]);
        assert!(announcer.is_running());
        announcer.wait_idle().await;

        assert_eq!(screen.calls(), ["C001", "C002"]);
        assert_eq!(announcer.loops_started(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ingest_during_last_dwell_continues_same_loop() {
        let (announcer, screen, _) = announcer();
        announcer.ingest(&[call("C001")]);
        settle().await;

        sleep(Duration::from_secs(4)).await;
        announcer.ingest(&[call("C002"), call("C001")]);
        announcer.wait_idle().await;

        assert_eq!(screen.calls(), ["C001", "C002"]);
        assert_eq!(announcer.loops_started(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_ingest_does_not_start_loop() {
        let (announcer, screen, _) = announcer();
        assert_eq!(announcer.ingest(&[]), 0);
        assert!(!announcer.is_running());
        settle().await;
        assert!(screen.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_loop_and_ignores_ingest() {
        let (announcer, screen, _) = announcer();
        announcer.ingest(&[call("C003"), call("C002"), call("C001")]);
        settle().await;

        announcer.stop();
        announcer.wait_idle().await;
        assert!(announcer.is_stopped());
        assert!(!announcer.is_running());

        assert_eq!(announcer.ingest(&[call("C004")]), 0);
        sleep(DWELL * 4).await;
        assert_eq!(screen.calls(), ["C001"]);
    }
}


#[cfg(kani)]
mod kani_proofs {
    use super::*;

    /// Two claims in a row never both start a loop
    #[kani::proof]
    fn guard_single_claim() {
        let mut guard = LoopGuard::default();
        let first = guard.claim(kani::any());
        let second = guard.claim(kani::any());
        kani::assert(!(first && second), "only one claimant may start the loop");
    }

    #[kani::proof]
    fn guard_claim_requires_work() {
        let mut guard = LoopGuard::default();
        if guard.claim(false) {
            kani::assert(false, "claim without work must not start a loop");
        }
        kani::assert(!guard.is_running(), "guard stays idle without work");
    }
}
