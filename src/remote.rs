//! Operator-facing facade: playback commands, the state mirror and a
//! throttled reconnect button.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::client::RemoteClient;
use crate::error::Result;
use crate::mirror::PlaybackMirror;
use crate::protocol::{clamp_volume, ClientCommand};
use crate::status::ConnectionStatus;

/// Minimum spacing between two operator-triggered reconnects.
pub const DEFAULT_RECONNECT_THROTTLE: Duration = Duration::from_secs(1);

/// How long playback and song controls stay busy after a playback command.
pub const DEFAULT_PROCESSING_WINDOW: Duration = Duration::from_millis(1500);

/// Rejects calls that come sooner than `min_interval` after the last
/// accepted one.
#[derive(Debug, Clone)]
pub struct ReconnectThrottle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl ReconnectThrottle {
    /// A throttle admitting one call per `min_interval`.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Returns `true` (and records `now`) if a call is allowed at `now`.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.min_interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

impl Default for ReconnectThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_THROTTLE)
    }
}

/// A watch-backed busy flag that clears itself `hold` after the latest
/// [`mark`](Self::mark).
///
/// The server needs a moment to start or switch a track; while the flag is
/// set, playback and song controls should be treated as disabled.
#[derive(Debug, Clone)]
pub struct ProcessingWindow {
    flag: Arc<watch::Sender<bool>>,
    generation: Arc<AtomicU64>,
    hold: Duration,
}

impl ProcessingWindow {
    /// A cleared flag whose marks last `hold`.
    pub fn new(hold: Duration) -> Self {
        Self {
            flag: Arc::new(watch::Sender::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            hold,
        }
    }

    /// Set the flag and schedule it to clear after `hold`. A later mark
    /// restarts the window.
    ///
    /// Outside a Tokio runtime nothing could clear the flag again, so the
    /// mark is skipped.
    pub fn mark(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime, processing window not started");
            return;
        };
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.flag.send_replace(true);

        let flag = Arc::clone(&self.flag);
        let current = Arc::clone(&self.generation);
        let hold = self.hold;
        runtime.spawn(async move {
            tokio::time::sleep(hold).await;
            if current.load(Ordering::Acquire) == generation {
                flag.send_replace(false);
            }
        });
    }

    /// Whether the flag is currently set.
    pub fn is_active(&self) -> bool {
        *self.flag.borrow()
    }

    /// A receiver notified whenever the flag flips.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.flag.subscribe()
    }
}

impl Default for ProcessingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_PROCESSING_WINDOW)
    }
}

/// A [`RemoteClient`] paired with a [`PlaybackMirror`].
///
/// Toggles are computed from the mirrored values; the mirror itself only
/// changes when the server confirms.
#[derive(Debug)]
pub struct RemoteControl {
    client: RemoteClient,
    mirror: PlaybackMirror,
    throttle: ReconnectThrottle,
    processing: ProcessingWindow,
}

impl RemoteControl {
    /// Wrap `client` and install the mirror's event handlers on it.
    ///
    /// # Errors
    ///
    /// Fails if the client has been shut down.
    pub fn new(client: RemoteClient) -> Result<Self> {
        let mirror = PlaybackMirror::new();
        mirror.install(&client)?;
        Ok(Self {
            client,
            mirror,
            throttle: ReconnectThrottle::default(),
            processing: ProcessingWindow::default(),
        })
    }

    /// Replace the reconnect throttle.
    #[must_use]
    pub fn with_reconnect_throttle(mut self, min_interval: Duration) -> Self {
        self.throttle = ReconnectThrottle::new(min_interval);
        self
    }

    /// Replace how long playback commands keep the controls busy.
    #[must_use]
    pub fn with_processing_window(mut self, hold: Duration) -> Self {
        self.processing = ProcessingWindow::new(hold);
        self
    }

    /// Start the underlying client.
    ///
    /// # Errors
    ///
    /// See [`RemoteClient::start`].
    pub fn start(&mut self) -> Result<()> {
        self.client.start()
    }

    /// Request a volume change. Out-of-range values are clamped to 0..=100.
    ///
    /// # Errors
    ///
    /// See [`RemoteClient::emit`].
    pub fn change_volume(&self, volume: i64) -> Result<()> {
        self.client
            .emit(ClientCommand::ChangeVolume(clamp_volume(volume)))
    }

    /// Ask the server to flip between playing and stopped. Marks the
    /// controls busy for the processing window.
    ///
    /// # Errors
    ///
    /// See [`RemoteClient::emit`].
    pub fn toggle_playback(&self) -> Result<()> {
        self.processing.mark();
        let next = if self.mirror.playback_state() == 0 { 1 } else { 0 };
        self.client.emit(ClientCommand::ChangeState(next))
    }

    /// Ask the server to flip the mute flag.
    ///
    /// # Errors
    ///
    /// See [`RemoteClient::emit`].
    pub fn toggle_mute(&self) -> Result<()> {
        let next = if self.mirror.mute() == 0 { 1 } else { 0 };
        self.client.emit(ClientCommand::ChangeMute(next))
    }

    /// Ask the server to switch songs. Returns `Ok(false)` without sending
    /// anything when `next` is already the current song.
    ///
    /// While a track is playing this marks the controls busy, even if
    /// nothing is sent.
    ///
    /// # Errors
    ///
    /// See [`RemoteClient::emit`].
    pub fn change_song(&self, next: impl Into<String>) -> Result<bool> {
        if self.mirror.playback_state() != 0 {
            self.processing.mark();
        }
        let next = next.into();
        let previous = self.mirror.current_song();
        if previous == next {
            debug!(song = %next, "song unchanged, nothing sent");
            return Ok(false);
        }
        self.client
            .emit(ClientCommand::ChangeSong { previous, next })?;
        Ok(true)
    }

    /// Operator reconnect. Returns `Ok(false)` if throttled.
    ///
    /// # Errors
    ///
    /// See [`RemoteClient::reconnect`].
    pub fn request_reconnect(&mut self) -> Result<bool> {
        if !self.throttle.try_acquire(Instant::now()) {
            debug!("reconnect request throttled");
            return Ok(false);
        }
        info!("operator requested reconnect");
        self.client.reconnect()?;
        Ok(true)
    }

    /// Whether playback and song controls are inside the processing window.
    pub fn is_processing(&self) -> bool {
        self.processing.is_active()
    }

    /// A receiver notified when the processing flag flips.
    pub fn watch_processing(&self) -> watch::Receiver<bool> {
        self.processing.watch()
    }

    /// The client's current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.client.status()
    }

    /// A receiver notified on every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.client.watch_status()
    }

    /// The mirrored playback values.
    pub fn mirror(&self) -> &PlaybackMirror {
        &self.mirror
    }

    /// The underlying client.
    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    /// Shut down the underlying client.
    pub async fn shutdown(&mut self) {
        self.client.shutdown().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn throttle_rejects_calls_within_interval() {
        let mut throttle = ReconnectThrottle::default();
        let t0 = Instant::now();
        assert!(throttle.try_acquire(t0));
        assert!(!throttle.try_acquire(t0 + Duration::from_millis(999)));
        assert!(throttle.try_acquire(t0 + Duration::from_secs(1)));
        assert!(!throttle.try_acquire(t0 + Duration::from_millis(1500)));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_calls_do_not_extend_the_window() {
        let mut throttle = ReconnectThrottle::new(Duration::from_secs(2));
        let t0 = Instant::now();
        assert!(throttle.try_acquire(t0));
        assert!(!throttle.try_acquire(t0 + Duration::from_secs(1)));
        assert!(throttle.try_acquire(t0 + Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn processing_window_clears_after_hold() {
        let window = ProcessingWindow::default();
        let mut rx = window.watch();
        assert!(!window.is_active());

        let t0 = Instant::now();
        window.mark();
        assert!(window.is_active());

        rx.wait_for(|busy| !*busy).await.unwrap();
        assert!(t0.elapsed() >= DEFAULT_PROCESSING_WINDOW);
        assert!(!window.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn later_mark_restarts_the_window() {
        let window = ProcessingWindow::new(Duration::from_millis(1500));
        window.mark();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        window.mark();

        // The first mark's deadline passes without clearing the flag.
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(window.is_active());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!window.is_active());
    }

    #[test]
    fn mark_outside_a_runtime_is_skipped() {
        let window = ProcessingWindow::default();
        window.mark();
        assert!(!window.is_active());
    }
}
