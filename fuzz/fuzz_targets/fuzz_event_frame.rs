#![no_main]

use libfuzzer_sys::fuzz_target;
use playback_remote::protocol::{EventFrame, ServerEvent};

fuzz_target!(|data: &[u8]| {
    // Raw-byte path, including serde_json's own UTF-8 validation.
    let Ok(frame) = serde_json::from_slice::<EventFrame>(data) else {
        return;
    };

    // Every frame that parses must decode to an event or a DecodeError,
    // and decoded volumes must already be clamped.
    if let Ok(ServerEvent::VolumeChanged(volume)) = ServerEvent::decode(&frame.event, &frame.args) {
        assert!(volume <= 100);
    }

    // Re-encoding a parsed frame must produce a frame that parses again.
    if let Ok(text) = serde_json::to_string(&frame) {
        let _ = serde_json::from_str::<EventFrame>(&text);
    }
});
