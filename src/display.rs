//! Public display page lifecycle
//!
//! Polls the board status on a fixed cadence, refreshes the side panels and
//! feeds recent calls to the [`Announcer`]. A failed poll only affects the
//! panels; whatever is already queued keeps being announced.

use chrono::Utc;
use chrono_tz::Tz;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::announcer::Announcer;
use crate::client::{ApiError, QueueClient};
use crate::config::Config;
use crate::health::HealthMetrics;
use crate::model::BoardStatus;
use crate::screen::{BoardView, PanelLimits, Screen};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct Display {
    announcer: Announcer,
    screen: Arc<dyn Screen>,
    metrics: Arc<HealthMetrics>,
    panels: PanelLimits,
    timezone: Tz,
}

impl Display {
    pub fn new(config: &Config, screen: Arc<dyn Screen>, metrics: Arc<HealthMetrics>) -> Self {
        Self {
            announcer: Announcer::new(screen.clone(), metrics.clone(), config.dwell),
            screen,
            metrics,
            panels: config.panels,
            timezone: config.timezone(),
        }
    }

    pub fn announcer(&self) -> &Announcer {
        &self.announcer
    }

    /// Apply one poll result. Returns the number of newly queued calls.
    pub fn apply(&self, result: Result<BoardStatus, ApiError>) -> usize {
        match result {
            Ok(status) => {
                self.metrics.record_poll_success();

                let now = Utc::now().with_timezone(&self.timezone);
                self.screen
                    .show_board(&BoardView::from_status(&status, self.panels, now));

                let added = self.announcer.ingest(&status.recent_calls);
                debug!(
                    "Board refreshed: {} waiting, {} recent, {} new call(s)",
                    status.waiting.len(),
                    status.recent_calls.len(),
                    added
                );
                added
            }
            Err(e) => {
                warn!("Failed to refresh board: {}", e);
                self.metrics.record_poll_failure();
                self.screen.show_offline(&e.to_string());
                0
            }
        }
    }

    pub async fn poll_once(&self, client: &QueueClient) -> usize {
        self.apply(client.board_status().await)
    }

    /// Single refresh, then wait for every queued call to be shown
    pub async fn run_once(&self, client: &QueueClient) {
        self.screen.show_idle();
        self.poll_once(client).await;
        self.announcer.wait_idle().await;
    }

    /// Poll every `interval` until `cancel_token` fires
    pub async fn run(&self, client: &QueueClient, interval: Duration, cancel_token: CancellationToken) {
        self.run_with(interval, cancel_token, || client.board_status())
            .await
    }

    /// Poll loop over any board source. The first poll starts immediately;
    /// a poll slower than `interval` pushes the next one back instead of
    /// bursting.
    pub async fn run_with<F, Fut>(&self, interval: Duration, cancel_token: CancellationToken, mut fetch: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<BoardStatus, ApiError>>,
    {
        let interval = interval.max(MIN_POLL_INTERVAL);
        info!("Display started, polling every {:?}", interval);
        self.screen.show_idle();

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        result = fetch() => {
                            self.apply(result);
                        }
                        _ = cancel_token.cancelled() => break,
                    }
                }
                _ = cancel_token.cancelled() => break,
            }
        }

        info!("Display shutting down");
        self.announcer.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announcer::testing::{call, Event, RecordingScreen};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn display() -> (Display, Arc<RecordingScreen>, Arc<HealthMetrics>) {
        let config = Config::from_getter(|_| None).unwrap();
        let screen = Arc::new(RecordingScreen::default());
        let metrics = Arc::new(HealthMetrics::new());
        let display = Display::new(&config, screen.clone(), metrics.clone());
        (display, screen, metrics)
    }

    fn status(codes: &[&str]) -> BoardStatus {
        BoardStatus {
            recent_calls: codes.iter().map(|c| call(c)).collect(),
            ..BoardStatus::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_success_renders_and_ingests() {
        let (display, screen, metrics) = display();

        let added = display.apply(Ok(status(&["C002", "C001"])));
        assert_eq!(added, 2);
        assert_eq!(metrics.status().polls_successful, 1);

        display.announcer().wait_idle().await;
        let events = screen.events();
        assert_eq!(events[0], Event::Board(2));
        assert_eq!(screen.calls(), ["C001", "C002"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_failure_keeps_draining() {
        let (display, screen, metrics) = display();
        display.apply(Ok(status(&["C002", "C001"])));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let added = display.apply(Err(ApiError::Status {
            code: 502,
            message: "Bad Gateway".into(),
        }));
        assert_eq!(added, 0);
        assert_eq!(metrics.status().polls_failed, 1);
        assert!(!metrics.status().last_poll_ok);

        display.announcer().wait_idle().await;
        assert_eq!(screen.calls(), ["C001", "C002"]);
        assert!(screen
            .events()
            .contains(&Event::Offline("server returned 502: Bad Gateway".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_board_is_not_an_error() {
        let (display, screen, metrics) = display();
        assert_eq!(display.apply(Ok(BoardStatus::default())), 0);
        assert_eq!(metrics.status().polls_failed, 0);
        assert!(!display.announcer().is_running());
        assert_eq!(screen.events(), [Event::Board(0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_board_panel_truncated_but_all_recent_ingested() {
        let (display, screen, _) = display();
        let codes = ["C006", "C005", "C004", "C003", "C002", "C001"];
        assert_eq!(display.apply(Ok(status(&codes))), 6);
        assert_eq!(screen.events()[0], Event::Board(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_ingests_calls_with_fractional_minutes() {
        let (display, screen, _) = display();
        let status: BoardStatus = serde_json::from_str(
            r#"{"chamadosRecentes":[{"senha":"C002","tempo":"2"},{"senha":"C001","tempo":1.5}]}"#,
        )
        .unwrap();
        assert_eq!(display.apply(Ok(status)), 2);
        display.announcer().wait_idle().await;
        assert_eq!(screen.calls(), ["C001", "C002"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_once_per_interval() {
        let (display, screen, metrics) = display();
        let cancel = CancellationToken::new();
        let polls = AtomicUsize::new(0);
        let start = Instant::now();
        let first_poll = Mutex::new(None);

        let fetch = || {
            polls.fetch_add(1, Ordering::SeqCst);
            first_poll.lock().unwrap().get_or_insert(start.elapsed());
            async { Ok::<_, ApiError>(BoardStatus::default()) }
        };

        tokio::join!(
            display.run_with(Duration::from_secs(3), cancel.clone(), fetch),
            async {
                tokio::time::sleep(Duration::from_secs(7)).await;
                cancel.cancel();
            }
        );

        // Ticks at 0s, 3s and 6s
        assert_eq!(polls.load(Ordering::SeqCst), 3);
        assert_eq!(*first_poll.lock().unwrap(), Some(Duration::ZERO));
        assert_eq!(metrics.status().polls_successful, 3);
        assert_eq!(screen.events()[0], Event::Idle);
        assert!(display.announcer().is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_slow_poll_delays_next_tick() {
        let (display, _, _) = display();
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let starts = Mutex::new(Vec::new());

        let fetch = || {
            let n = {
                let mut starts = starts.lock().unwrap();
                starts.push(start.elapsed());
                starts.len()
            };
            async move {
                if n == 1 {
                    tokio::time::sleep(Duration::from_secs(4)).await;
                }
                Ok::<_, ApiError>(BoardStatus::default())
            }
        };

        tokio::join!(
            display.run_with(Duration::from_secs(3), cancel.clone(), fetch),
            async {
                tokio::time::sleep(Duration::from_secs(11)).await;
                cancel.cancel();
            }
        );

        let secs: Vec<u64> = starts.lock().unwrap().iter().map(|d| d.as_secs()).collect();
        assert_eq!(secs, [0, 4, 7, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_cancel_interrupts_hung_poll() {
        let (display, _, metrics) = display();
        let cancel = CancellationToken::new();

        tokio::join!(
            display.run_with(Duration::from_secs(3), cancel.clone(), || {
                std::future::pending::<Result<BoardStatus, ApiError>>()
            }),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                cancel.cancel();
            }
        );

        assert_eq!(metrics.status().polls_successful, 0);
        assert_eq!(metrics.status().polls_failed, 0);
        assert!(display.announcer().is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_zero_interval_does_not_panic() {
        let (display, _, metrics) = display();
        let cancel = CancellationToken::new();

        tokio::join!(
            display.run_with(Duration::ZERO, cancel.clone(), || async {
                Ok::<_, ApiError>(BoardStatus::default())
            }),
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                cancel.cancel();
            }
        );

        assert!(metrics.status().polls_successful >= 1);
    }
}
