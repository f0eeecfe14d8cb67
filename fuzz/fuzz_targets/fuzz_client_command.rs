#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Anything that parses as a command must re-encode into a frame that
    // parses back with the same id and command name.
    if let Ok((id, command)) = blazium_lobby_client::protocol::parse_command(text) {
        let encoded = blazium_lobby_client::protocol::encode_command(&id, &command)
            .expect("parsed command must re-encode");
        let (again_id, again) = blazium_lobby_client::protocol::parse_command(&encoded)
            .expect("encoded command must parse");
        assert_eq!(again_id, id);
        assert_eq!(again.name(), command.name());
    }
});
