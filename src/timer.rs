//! Cancellable timers owned by the connection task.
//!
//! Both timers are plain values polled from a single `tokio::select!` loop.
//! While unarmed their wait futures never complete, so cancelling is just a
//! state change: once [`Deadline::cancel`] or [`Ticker::stop`] returns, the
//! timer cannot fire again. Arming replaces whatever was armed before, which
//! keeps at most one instance of each kind alive.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// A one-shot deadline.
#[derive(Debug, Default)]
pub(crate) struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arm for `at`, replacing any earlier deadline.
    pub(crate) fn arm(&mut self, at: Instant) {
        self.at = Some(at);
    }

    pub(crate) fn cancel(&mut self) {
        self.at = None;
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.at.is_some()
    }

    /// Resolves when the armed deadline passes, disarming it. Pending forever
    /// while unarmed.
    ///
    /// Cancel-safe: dropping the future leaves the deadline armed.
    pub(crate) async fn expired(&mut self) {
        match self.at {
            Some(at) => {
                time::sleep_until(at).await;
                self.at = None;
            }
            None => std::future::pending().await,
        }
    }
}

/// A periodic ticker that can be started and stopped.
#[derive(Debug, Default)]
pub(crate) struct Ticker {
    interval: Option<Interval>,
}

impl Ticker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Start ticking every `period`, first tick one period from now. Restarts
    /// the schedule if already running.
    pub(crate) fn start(&mut self, period: Duration) {
        // tokio rejects a zero period.
        let period = period.max(Duration::from_millis(1));
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    pub(crate) fn stop(&mut self) {
        self.interval = None;
    }

    pub(crate) fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Resolves on the next tick. Pending forever while stopped.
    ///
    /// Cancel-safe, as [`Interval::tick`] is.
    pub(crate) async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }
}
