#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Wire-format tests for the playback-control event protocol.
//!
//! Frames are parsed from the literal JSON a server sends, so any drift in
//! field names or argument encoding shows up here.

use playback_remote::protocol::{ClientCommand, EventFrame, ServerEvent};
use playback_remote::DecodeError;
use serde_json::json;

fn decode_wire(text: &str) -> Result<ServerEvent, DecodeError> {
    let frame: EventFrame = serde_json::from_str(text).unwrap();
    ServerEvent::decode(&frame.event, &frame.args)
}

// ── Inbound frames ──────────────────────────────────────────────────

#[test]
fn server_frames_decode_to_typed_events() {
    assert_eq!(
        decode_wire(r#"{"event":"stateChanged","args":[1]}"#),
        Ok(ServerEvent::StateChanged(1))
    );
    assert_eq!(
        decode_wire(r#"{"event":"muteChanged","args":[0]}"#),
        Ok(ServerEvent::MuteChanged(0))
    );
    assert_eq!(
        decode_wire(r#"{"event":"songChanged","args":["fast"]}"#),
        Ok(ServerEvent::SongChanged("fast".into()))
    );
    assert_eq!(decode_wire(r#"{"event":"ping"}"#), Ok(ServerEvent::Ping));
}

#[test]
fn volume_encodings_from_the_wire() {
    assert_eq!(
        decode_wire(r#"{"event":"volumeChanged","args":[35]}"#),
        Ok(ServerEvent::VolumeChanged(35))
    );
    assert_eq!(
        decode_wire(r#"{"event":"volumeChanged","args":[35.0]}"#),
        Ok(ServerEvent::VolumeChanged(35))
    );
    assert_eq!(
        decode_wire(r#"{"event":"volumeChanged","args":[150]}"#),
        Ok(ServerEvent::VolumeChanged(100))
    );
    assert_eq!(
        decode_wire(r#"{"event":"volumeChanged","args":[-20.5]}"#),
        Ok(ServerEvent::VolumeChanged(0))
    );
}

#[test]
fn extra_arguments_are_ignored() {
    assert_eq!(
        decode_wire(r#"{"event":"stateChanged","args":[1,"extra",null]}"#),
        Ok(ServerEvent::StateChanged(1))
    );
}

#[test]
fn malformed_payloads_are_decode_errors() {
    assert!(matches!(
        decode_wire(r#"{"event":"volumeChanged","args":["loud"]}"#),
        Err(DecodeError::WrongType { .. })
    ));
    assert!(matches!(
        decode_wire(r#"{"event":"volumeChanged","args":[null]}"#),
        Err(DecodeError::MissingArgument { .. })
    ));
    assert!(matches!(
        decode_wire(r#"{"event":"songChanged"}"#),
        Err(DecodeError::MissingArgument { .. })
    ));
    assert!(matches!(
        decode_wire(r#"{"event":"muteChanged","args":[true]}"#),
        Err(DecodeError::WrongType { .. })
    ));
    assert_eq!(
        decode_wire(r#"{"event":"shuffle","args":[1]}"#),
        Err(DecodeError::UnknownEvent("shuffle".into()))
    );
}

#[test]
fn decode_error_messages_name_the_event() {
    let err = decode_wire(r#"{"event":"volumeChanged","args":["loud"]}"#).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("volumeChanged"), "{msg}");
    assert!(msg.contains("loud"), "{msg}");
}

#[test]
fn frames_without_an_event_name_do_not_parse() {
    assert!(serde_json::from_str::<EventFrame>(r#"{"args":[1]}"#).is_err());
    assert!(serde_json::from_str::<EventFrame>("[]").is_err());
}

// ── Outbound frames ─────────────────────────────────────────────────

#[test]
fn command_frames_match_the_server_format() {
    let cases = [
        (ClientCommand::ChangeVolume(70), json!({"event":"changeVolume","args":[70]})),
        (ClientCommand::ChangeState(1), json!({"event":"changeState","args":[1]})),
        (ClientCommand::ChangeMute(0), json!({"event":"changeMute","args":[0]})),
        (
            ClientCommand::ChangeSong {
                previous: "slow".into(),
                next: "fast".into(),
            },
            json!({"event":"changeSong","args":["slow","fast"]}),
        ),
        (ClientCommand::GetVolume, json!({"event":"getVolume"})),
        (ClientCommand::GetCurrentSong, json!({"event":"getCurrentSong"})),
    ];

    for (command, expected) in cases {
        let value = serde_json::to_value(command.into_frame()).unwrap();
        assert_eq!(value, expected);
    }
}
