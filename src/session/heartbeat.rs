//! Periodic liveness check scheduling.
//!
//! [`HeartbeatMonitor`] owns at most one running heartbeat loop. Starting it again
//! cancels the previous loop first, so two loops never overlap. Ticks are
//! skipped while the user has been active recently (see [`ActivityClock`]).

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Whether the heartbeat loop keeps running after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    /// Keep probing.
    Continue,
    /// Stop the loop.
    Stop,
}

/// Shared timestamp of the last user-initiated send.
#[derive(Debug, Clone, Default)]
pub struct ActivityClock {
    last: Arc<Mutex<Option<Instant>>>,
}

impl ActivityClock {
    /// Clock with no recorded activity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record activity now.
    pub fn touch(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    /// Time since the last recorded activity, `None` if there was none.
    pub fn idle_for(&self) -> Option<Duration> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|t| t.elapsed())
    }

    /// Whether activity was recorded within `window`.
    pub fn active_within(&self, window: Duration) -> bool {
        self.idle_for().is_some_and(|idle| idle < window)
    }
}

/// Owner of the heartbeat loop.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    interval: Duration,
    activity_timeout: Duration,
    activity: ActivityClock,
    running: Mutex<Option<CancellationToken>>,
}

impl HeartbeatMonitor {
    /// Monitor ticking every `interval`, skipping ticks while `activity` was
    /// touched within `activity_timeout`.
    pub fn new(interval: Duration, activity_timeout: Duration, activity: ActivityClock) -> Self {
        Self {
            interval,
            activity_timeout,
            activity,
            running: Mutex::new(None),
        }
    }

    /// Start probing with `tick`, replacing any loop already running.
    ///
    /// The first tick fires one interval after starting. Must be called from
    /// within a Tokio runtime.
    pub fn start<F, Fut>(&self, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TickControl> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        {
            let mut slot = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = slot.replace(cancel.clone()) {
                debug!("superseding running heartbeat");
                previous.cancel();
            }
        }

        let period = self.interval;
        let activity_timeout = self.activity_timeout;
        let activity = self.activity.clone();
        info!(interval_ms = period.as_millis() as u64, "heartbeat started");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("heartbeat cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if activity.active_within(activity_timeout) {
                            debug!("recent activity, skipping heartbeat");
                            continue;
                        }
                        if tick().await == TickControl::Stop {
                            info!("heartbeat stopped by tick");
                            cancel.cancel();
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Cancel the running loop, if any.
    pub fn stop(&self) {
        if let Some(cancel) = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            cancel.cancel();
            info!("heartbeat stopped");
        }
    }

    /// Whether a loop is currently running.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|c| !c.is_cancelled())
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<TickControl> + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(TickControl::Continue)
        }
    }

    fn monitor(activity: ActivityClock) -> HeartbeatMonitor {
        HeartbeatMonitor::new(Duration::from_millis(10), Duration::from_millis(200), activity)
    }

    #[tokio::test]
    async fn ticks_until_stopped() {
        let hb = monitor(ActivityClock::new());
        let count = Arc::new(AtomicUsize::new(0));
        hb.start(counting(&count));
        assert!(hb.is_running());

        tokio::time::sleep(Duration::from_millis(80)).await;
        hb.stop();
        assert!(!hb.is_running());
        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop >= 2, "expected several ticks, got {after_stop}");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn restart_supersedes_previous_loop() {
        let hb = monitor(ActivityClock::new());
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        hb.start(counting(&first));
        tokio::time::sleep(Duration::from_millis(40)).await;
        hb.start(counting(&second));
        let first_at_restart = first.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(first.load(Ordering::SeqCst), first_at_restart);
        assert!(second.load(Ordering::SeqCst) >= 1);
        hb.stop();
    }

    #[tokio::test]
    async fn recent_activity_suppresses_ticks() {
        let activity = ActivityClock::new();
        activity.touch();
        let hb = monitor(activity.clone());
        let count = Arc::new(AtomicUsize::new(0));
        hb.start(counting(&count));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        hb.stop();
    }

    #[tokio::test]
    async fn tick_can_stop_the_loop() {
        let hb = monitor(ActivityClock::new());
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        hb.start(move || {
            c.fetch_add(1, Ordering::SeqCst);
            std::future::ready(TickControl::Stop)
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!hb.is_running());
    }

    #[test]
    fn activity_clock_windows() {
        let clock = ActivityClock::new();
        assert!(clock.idle_for().is_none());
        assert!(!clock.active_within(Duration::from_secs(1)));
        clock.touch();
        assert!(clock.active_within(Duration::from_secs(60)));
    }
}
