#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Inbound frames arrive as text; non-UTF-8 input never reaches the
    // decoder.
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let frame = blazium_lobby_client::protocol::decode_frame(text);
    let _ = frame.id();
    let _ = frame.lobby().map(blazium_lobby_client::LobbyInfo::from_dict);
    if let Some(peers) = frame.peers() {
        let _ = blazium_lobby_client::model::parse_roster(peers);
    }
});
