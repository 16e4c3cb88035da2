#![no_main]

use libfuzzer_sys::fuzz_target;
use webtile_client::blocking::{announces_seed, classify};
use webtile_client::protocol::{decode_frame, parse_game_links};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Frame decoding and classification must reject, never panic.
    for message in decode_frame(text).iter().flatten() {
        let _ = classify(message);
        let _ = announces_seed(message, "1");
        if let Some(content) = message.str_field("content") {
            let _ = parse_game_links(content);
        }
    }

    let _ = parse_game_links(text);
});
