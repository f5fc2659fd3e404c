#![no_main]

use libfuzzer_sys::fuzz_target;
use secret_hitler_client::protocol::ServerMessage;

fuzz_target!(|data: &[u8]| {
    // Raw bytes, including serde_json's own UTF-8 handling.
    let _ = serde_json::from_slice::<ServerMessage>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(ServerMessage::Game(snapshot)) = serde_json::from_str::<ServerMessage>(s) {
            let _ = snapshot.validate();
        }
    }
});
