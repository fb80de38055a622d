//! Periodic keepalive timer
//!
//! A [`Heartbeat`] fires its target once per period, starting one full period
//! after it was started. It holds the target weakly so a pending timer never
//! keeps a connection alive, and it is cancelled by `stop` or by dropping it.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::trace;

/// Something that wants to be poked on every heartbeat tick
pub trait HeartbeatTarget: Send + Sync + 'static {
    fn beat(&self);
}

/// Handle to a running heartbeat task
#[derive(Debug)]
pub struct Heartbeat {
    period: Duration,
    task: JoinHandle<()>,
}

impl Heartbeat {
    /// Start firing `target` every `period`
    ///
    /// Must be called from within a Tokio runtime. `period` must be non-zero;
    /// [`crate::ConnectionConfig::validate`] enforces this for connections.
    pub fn start<T: HeartbeatTarget>(target: Weak<T>, period: Duration) -> Self {
        let task = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticks.tick().await;
                let Some(target) = target.upgrade() else {
                    trace!("heartbeat target dropped, stopping");
                    break;
                };
                target.beat();
            }
        });

        Self { period, task }
    }

    /// Interval between firings
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the timer task is still scheduled
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancel the timer; no firing happens after this returns
    pub fn stop(self) {
        // Drop aborts the task
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counter {
        beats: AtomicUsize,
    }

    impl HeartbeatTarget for Counter {
        fn beat(&self) {
            self.beats.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Counter {
        fn beats(&self) -> usize {
            self.beats.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_beat_after_one_period() {
        let counter = Arc::new(Counter::default());
        let _heartbeat = Heartbeat::start(Arc::downgrade(&counter), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(counter.beats(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.beats(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counter.beats(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_future_beats() {
        let counter = Arc::new(Counter::default());
        let heartbeat = Heartbeat::start(Arc::downgrade(&counter), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(counter.beats(), 2);

        heartbeat.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.beats(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exits_when_target_dropped() {
        let counter = Arc::new(Counter::default());
        let heartbeat = Heartbeat::start(Arc::downgrade(&counter), Duration::from_secs(1));
        assert_eq!(heartbeat.period(), Duration::from_secs(1));

        drop(counter);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!heartbeat.is_running());
    }
}
