#![no_main]

use libfuzzer_sys::fuzz_target;
use room_sync_client::snapshot::RoomSnapshot;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(snapshot) = RoomSnapshot::from_json(s) {
            // Accessors must hold up on any validated snapshot.
            let _ = snapshot.marker();
            for player in &snapshot.players {
                let _ = snapshot.score_of(player.user_id);
            }
        }
    }
});
