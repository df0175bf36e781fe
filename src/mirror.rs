//! Local mirror of the server's playback state.
//!
//! The server is authoritative: commands are never applied locally, the
//! mirror only changes when a `*Changed` event arrives. Each value lives in a
//! [`watch`] channel so UI code can both read it and await changes.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::client::RemoteClient;
use crate::error::Result;
use crate::protocol::{ServerEvent, MUTE_CHANGED, SONG_CHANGED, STATE_CHANGED, VOLUME_CHANGED};

/// Volume shown before the server has reported one.
pub const DEFAULT_VOLUME: u8 = 50;
/// Playback state shown before the server has reported one (0 = stopped).
pub const DEFAULT_PLAYBACK_STATE: i64 = 0;
/// Mute flag shown before the server has reported one (0 = unmuted).
pub const DEFAULT_MUTE: i64 = 0;
/// Song shown before the server has reported one.
pub const DEFAULT_SONG: &str = "slow";

struct Channels {
    volume: watch::Sender<u8>,
    state: watch::Sender<i64>,
    mute: watch::Sender<i64>,
    song: watch::Sender<String>,
}

/// Watch-backed playback values. Cheap to clone; clones share the values.
#[derive(Clone)]
pub struct PlaybackMirror {
    inner: Arc<Channels>,
}

impl PlaybackMirror {
    /// Create a mirror holding the default values.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Channels {
                volume: watch::Sender::new(DEFAULT_VOLUME),
                state: watch::Sender::new(DEFAULT_PLAYBACK_STATE),
                mute: watch::Sender::new(DEFAULT_MUTE),
                song: watch::Sender::new(DEFAULT_SONG.to_string()),
            }),
        }
    }

    /// Register one handler per `*Changed` event on `client`.
    ///
    /// # Errors
    ///
    /// Fails if the client has been shut down.
    pub fn install(&self, client: &RemoteClient) -> Result<()> {
        for event in [STATE_CHANGED, VOLUME_CHANGED, MUTE_CHANGED, SONG_CHANGED] {
            let mirror = self.clone();
            client.on(event, move |args: &[Value]| mirror.handle(event, args))?;
        }
        Ok(())
    }

    /// Decode a raw event and apply it. Undecodable payloads are logged and
    /// leave every value untouched.
    pub fn handle(&self, event: &str, args: &[Value]) {
        match ServerEvent::decode(event, args) {
            Ok(decoded) => self.apply(decoded),
            Err(e) => warn!(event, "dropping undecodable payload: {e}"),
        }
    }

    /// Apply a decoded server event.
    pub fn apply(&self, event: ServerEvent) {
        debug!(event = event.name(), "mirror update");
        match event {
            ServerEvent::StateChanged(state) => {
                self.inner.state.send_replace(state);
            }
            ServerEvent::VolumeChanged(volume) => {
                self.inner.volume.send_replace(volume);
            }
            ServerEvent::MuteChanged(mute) => {
                self.inner.mute.send_replace(mute);
            }
            ServerEvent::SongChanged(song) => {
                self.inner.song.send_replace(song);
            }
            ServerEvent::Ping => {}
        }
    }

    /// Last confirmed volume, 0..=100.
    pub fn volume(&self) -> u8 {
        *self.inner.volume.borrow()
    }

    /// Last confirmed playback state; 0 is stopped.
    pub fn playback_state(&self) -> i64 {
        *self.inner.state.borrow()
    }

    /// Last confirmed mute flag; 0 is unmuted.
    pub fn mute(&self) -> i64 {
        *self.inner.mute.borrow()
    }

    /// Last confirmed song name.
    pub fn current_song(&self) -> String {
        self.inner.song.borrow().clone()
    }

    /// A receiver notified on volume changes.
    pub fn watch_volume(&self) -> watch::Receiver<u8> {
        self.inner.volume.subscribe()
    }

    /// A receiver notified on playback state changes.
    pub fn watch_playback_state(&self) -> watch::Receiver<i64> {
        self.inner.state.subscribe()
    }

    /// A receiver notified on mute changes.
    pub fn watch_mute(&self) -> watch::Receiver<i64> {
        self.inner.mute.subscribe()
    }

    /// A receiver notified on song changes.
    pub fn watch_current_song(&self) -> watch::Receiver<String> {
        self.inner.song.subscribe()
    }
}

impl Default for PlaybackMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PlaybackMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackMirror")
            .field("volume", &self.volume())
            .field("state", &self.playback_state())
            .field("mute", &self.mute())
            .field("song", &self.current_song())
            .finish()
    }
}
