//! Liveness tracking for half-open links.
//!
//! Some failures never produce a transport-level disconnect (a peer that
//! vanished behind a NAT, a socket stuck half-open). The server therefore
//! pushes a periodic pulse, and the connection task polls
//! [`HeartbeatMonitor::is_timed_out`] on a fixed interval.

use std::time::Duration;

use tokio::time::Instant;

use crate::status::ConnectionStatus;

/// Default polling interval of the heartbeat check.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
/// Default silence after which a connected link is presumed dead.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(45);

/// Records when the last liveness signal arrived.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    last_signal_at: Instant,
    timeout: Duration,
}

impl HeartbeatMonitor {
    /// Create a monitor whose clock starts now.
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_signal_at: Instant::now(),
            timeout,
        }
    }

    /// Record an inbound liveness signal (or a fresh connection) at `now`.
    pub fn record(&mut self, now: Instant) {
        self.last_signal_at = now;
    }

    /// When the last signal was recorded.
    pub fn last_signal_at(&self) -> Instant {
        self.last_signal_at
    }

    /// The configured silence threshold.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the silence since the last signal exceeds the threshold.
    ///
    /// `status` must be the status at check time. Only a `Connected` link can
    /// time out, so a poll that races a reconnect or a grace period is a no-op.
    pub fn is_timed_out(&self, status: &ConnectionStatus, now: Instant) -> bool {
        status.is_connected() && now.saturating_duration_since(self.last_signal_at) > self.timeout
    }
}
