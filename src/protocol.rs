//! Playback-control protocol: event names and typed payloads.
//!
//! The server speaks a named-event protocol where every event carries a
//! positional argument list of JSON values. This module turns the inbound
//! `(name, args)` pairs into [`ServerEvent`]s through a typed decode step and
//! turns outbound [`ClientCommand`]s back into `(name, args)` pairs.
//!
//! Payload coercions:
//!
//! - `volumeChanged` accepts integer or floating encodings; floats are
//!   truncated toward zero and the result is clamped to `0..=100`.
//! - `stateChanged` / `muteChanged` require an integer.
//! - `songChanged` requires a string.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;

// ── Event names ─────────────────────────────────────────────────────

/// Inbound: playback state changed (`0` = stopped, non-zero = playing).
pub const STATE_CHANGED: &str = "stateChanged";
/// Inbound: volume changed.
pub const VOLUME_CHANGED: &str = "volumeChanged";
/// Inbound: mute flag changed.
pub const MUTE_CHANGED: &str = "muteChanged";
/// Inbound: current song changed.
pub const SONG_CHANGED: &str = "songChanged";
/// Inbound: default name of the server's liveness pulse.
pub const PING: &str = "ping";

/// Outbound: set the volume.
pub const CHANGE_VOLUME: &str = "changeVolume";
/// Outbound: set the playback state.
pub const CHANGE_STATE: &str = "changeState";
/// Outbound: set the mute flag.
pub const CHANGE_MUTE: &str = "changeMute";
/// Outbound: switch from one song to another.
pub const CHANGE_SONG: &str = "changeSong";

/// Outbound: request the current volume.
pub const GET_VOLUME: &str = "getVolume";
/// Outbound: request the current playback state.
pub const GET_STATE: &str = "getState";
/// Outbound: request the current mute flag.
pub const GET_MUTE: &str = "getMute";
/// Outbound: request the current song.
pub const GET_CURRENT_SONG: &str = "getCurrentSong";

/// Lowest accepted volume.
pub const VOLUME_MIN: u8 = 0;
/// Highest accepted volume.
pub const VOLUME_MAX: u8 = 100;

// ── Wire frame ──────────────────────────────────────────────────────

/// JSON text frame used by the built-in event transports.
///
/// ```json
/// {"event": "volumeChanged", "args": [42]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    /// Event name.
    pub event: String,
    /// Positional arguments. Omitted when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

impl EventFrame {
    /// Create a frame from a name and argument list.
    pub fn new(event: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            event: event.into(),
            args,
        }
    }
}

// ── Inbound events ──────────────────────────────────────────────────

/// A decoded domain event pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Playback state (`0` = stopped).
    StateChanged(i64),
    /// Volume, already clamped to `0..=100`.
    VolumeChanged(u8),
    /// Mute flag (`0` = unmuted).
    MuteChanged(i64),
    /// Name of the song now selected.
    SongChanged(String),
    /// Liveness pulse.
    Ping,
}

impl ServerEvent {
    /// Decode a named event and its arguments.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the name is unknown, the argument is
    /// missing, or the argument has the wrong type.
    pub fn decode(event: &str, args: &[Value]) -> Result<Self, DecodeError> {
        match event {
            STATE_CHANGED => decode_int(event, args).map(Self::StateChanged),
            VOLUME_CHANGED => decode_volume(event, args).map(Self::VolumeChanged),
            MUTE_CHANGED => decode_int(event, args).map(Self::MuteChanged),
            SONG_CHANGED => decode_string(event, args).map(Self::SongChanged),
            PING => Ok(Self::Ping),
            other => Err(DecodeError::UnknownEvent(other.to_string())),
        }
    }

    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StateChanged(_) => STATE_CHANGED,
            Self::VolumeChanged(_) => VOLUME_CHANGED,
            Self::MuteChanged(_) => MUTE_CHANGED,
            Self::SongChanged(_) => SONG_CHANGED,
            Self::Ping => PING,
        }
    }
}

fn first_arg<'a>(event: &str, args: &'a [Value]) -> Result<&'a Value, DecodeError> {
    match args.first() {
        Some(Value::Null) | None => Err(DecodeError::MissingArgument {
            event: event.to_string(),
        }),
        Some(value) => Ok(value),
    }
}

fn wrong_type(event: &str, expected: &'static str, found: &Value) -> DecodeError {
    DecodeError::WrongType {
        event: event.to_string(),
        expected,
        found: found.to_string(),
    }
}

fn decode_int(event: &str, args: &[Value]) -> Result<i64, DecodeError> {
    let value = first_arg(event, args)?;
    value
        .as_i64()
        .ok_or_else(|| wrong_type(event, "an integer", value))
}

fn decode_string(event: &str, args: &[Value]) -> Result<String, DecodeError> {
    let value = first_arg(event, args)?;
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| wrong_type(event, "a string", value))
}

fn decode_volume(event: &str, args: &[Value]) -> Result<u8, DecodeError> {
    let value = first_arg(event, args)?;
    if let Some(n) = value.as_i64() {
        return Ok(clamp_volume(n));
    }
    match value.as_f64() {
        // `as` saturates for out-of-range floats; NaN becomes 0.
        Some(f) if f.is_finite() => Ok(clamp_volume(f.trunc() as i64)),
        _ => Err(wrong_type(event, "a number", value)),
    }
}

/// Clamp an arbitrary integer volume into `0..=100`.
pub fn clamp_volume(volume: i64) -> u8 {
    let clamped = volume.clamp(i64::from(VOLUME_MIN), i64::from(VOLUME_MAX));
    u8::try_from(clamped).unwrap_or(VOLUME_MAX)
}

// ── Outbound commands ───────────────────────────────────────────────

/// A command the client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Set the volume.
    ChangeVolume(u8),
    /// Set the playback state.
    ChangeState(i64),
    /// Set the mute flag.
    ChangeMute(i64),
    /// Switch from `previous` to `next`.
    ChangeSong {
        /// Song currently playing.
        previous: String,
        /// Song to switch to.
        next: String,
    },
    /// Ask for the current volume.
    GetVolume,
    /// Ask for the current playback state.
    GetState,
    /// Ask for the current mute flag.
    GetMute,
    /// Ask for the current song.
    GetCurrentSong,
}

impl ClientCommand {
    /// The wire name of this command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChangeVolume(_) => CHANGE_VOLUME,
            Self::ChangeState(_) => CHANGE_STATE,
            Self::ChangeMute(_) => CHANGE_MUTE,
            Self::ChangeSong { .. } => CHANGE_SONG,
            Self::GetVolume => GET_VOLUME,
            Self::GetState => GET_STATE,
            Self::GetMute => GET_MUTE,
            Self::GetCurrentSong => GET_CURRENT_SONG,
        }
    }

    /// Positional arguments for the wire.
    pub fn args(&self) -> Vec<Value> {
        match self {
            Self::ChangeVolume(v) => vec![Value::from(*v)],
            Self::ChangeState(s) => vec![Value::from(*s)],
            Self::ChangeMute(m) => vec![Value::from(*m)],
            Self::ChangeSong { previous, next } => {
                vec![Value::from(previous.as_str()), Value::from(next.as_str())]
            }
            Self::GetVolume | Self::GetState | Self::GetMute | Self::GetCurrentSong => Vec::new(),
        }
    }

    /// Convert into an [`EventFrame`].
    pub fn into_frame(self) -> EventFrame {
        EventFrame::new(self.name(), self.args())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn volume_accepts_integers_and_floats() {
        assert_eq!(
            ServerEvent::decode(VOLUME_CHANGED, &[json!(42)]),
            Ok(ServerEvent::VolumeChanged(42))
        );
        assert_eq!(
            ServerEvent::decode(VOLUME_CHANGED, &[json!(42.9)]),
            Ok(ServerEvent::VolumeChanged(42))
        );
    }

    #[test]
    fn volume_is_clamped() {
        assert_eq!(
            ServerEvent::decode(VOLUME_CHANGED, &[json!(150)]),
            Ok(ServerEvent::VolumeChanged(100))
        );
        assert_eq!(
            ServerEvent::decode(VOLUME_CHANGED, &[json!(-3.5)]),
            Ok(ServerEvent::VolumeChanged(0))
        );
        assert_eq!(
            ServerEvent::decode(VOLUME_CHANGED, &[json!(1e300)]),
            Ok(ServerEvent::VolumeChanged(100))
        );
    }

    #[test]
    fn volume_rejects_non_numbers() {
        let err = ServerEvent::decode(VOLUME_CHANGED, &[json!("loud")]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::WrongType {
                expected: "a number",
                ..
            }
        ));
    }

    #[test]
    fn missing_and_null_arguments_are_rejected() {
        assert!(matches!(
            ServerEvent::decode(STATE_CHANGED, &[]),
            Err(DecodeError::MissingArgument { .. })
        ));
        assert!(matches!(
            ServerEvent::decode(SONG_CHANGED, &[Value::Null]),
            Err(DecodeError::MissingArgument { .. })
        ));
    }

    #[test]
    fn state_requires_integer() {
        assert_eq!(
            ServerEvent::decode(STATE_CHANGED, &[json!(1)]),
            Ok(ServerEvent::StateChanged(1))
        );
        assert!(ServerEvent::decode(STATE_CHANGED, &[json!(1.5)]).is_err());
        assert!(ServerEvent::decode(MUTE_CHANGED, &[json!(true)]).is_err());
    }

    #[test]
    fn ping_ignores_arguments() {
        assert_eq!(ServerEvent::decode(PING, &[]), Ok(ServerEvent::Ping));
    }

    #[test]
    fn unknown_event_is_an_error() {
        assert_eq!(
            ServerEvent::decode("lyricsChanged", &[]),
            Err(DecodeError::UnknownEvent("lyricsChanged".into()))
        );
    }

    #[test]
    fn change_song_carries_previous_and_next() {
        let cmd = ClientCommand::ChangeSong {
            previous: "slow".into(),
            next: "fast".into(),
        };
        assert_eq!(cmd.name(), CHANGE_SONG);
        assert_eq!(cmd.args(), vec![json!("slow"), json!("fast")]);
    }

    #[test]
    fn hydration_requests_have_no_arguments() {
        for cmd in [
            ClientCommand::GetVolume,
            ClientCommand::GetState,
            ClientCommand::GetMute,
            ClientCommand::GetCurrentSong,
        ] {
            assert!(cmd.args().is_empty(), "{} should carry no args", cmd.name());
        }
    }

    #[test]
    fn frame_omits_empty_args() {
        let json = serde_json::to_string(&ClientCommand::GetVolume.into_frame()).unwrap();
        assert_eq!(json, r#"{"event":"getVolume"}"#);

        let frame: EventFrame = serde_json::from_str(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(frame, EventFrame::new(PING, vec![]));
    }
}
