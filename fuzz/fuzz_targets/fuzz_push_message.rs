#![no_main]

use libfuzzer_sys::fuzz_target;
use room_sync_client::protocol::{PushEnvelope, PushMessage};

fuzz_target!(|data: &[u8]| {
    // Raw-byte envelope decoding, then payload validation.
    if let Ok(envelope) = serde_json::from_slice::<PushEnvelope>(data) {
        let _ = PushMessage::from_envelope(envelope);
    }

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = PushMessage::parse(s);
    }
});
