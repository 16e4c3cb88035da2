//! Named keystrokes.
//!
//! Callers send keys by name (`key_esc`, `key_dir_n`, `key_ctrl_s`); anything
//! that is not a known name goes to the game as literal text.

use crate::protocol::ClientMessage;

const KEYCODE_TAB: i32 = 9;
const KEYCODE_ENTER: i32 = 13;
const KEYCODE_ESC: i32 = 27;

/// Convert a key name, or literal text, into the message that sends it.
pub fn key_message(key: &str) -> ClientMessage {
    let keycode = match key {
        "key_tab" => Some(KEYCODE_TAB),
        "key_enter" => Some(KEYCODE_ENTER),
        "key_esc" => Some(KEYCODE_ESC),
        _ => key.strip_prefix("key_ctrl_").and_then(ctrl_keycode),
    };
    if let Some(keycode) = keycode {
        return ClientMessage::Key { keycode };
    }

    // Directions use the numpad layout.
    let text = match key {
        "key_dir_n" => "8",
        "key_dir_ne" => "9",
        "key_dir_e" => "6",
        "key_dir_se" => "3",
        "key_dir_s" => "2",
        "key_dir_sw" => "1",
        "key_dir_w" => "4",
        "key_dir_nw" => "7",
        "key_stair_down" => ">",
        "key_stair_up" => "<",
        other => other,
    };
    ClientMessage::Input {
        text: text.to_owned(),
    }
}

fn ctrl_keycode(letter: &str) -> Option<i32> {
    let mut chars = letter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_lowercase() => Some(i32::from(c as u8 - b'a') + 1),
        _ => None,
    }
}
