#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire format tests for the Webtile client.
//!
//! Verifies the JSON of every `ClientMessage` variant, inbound frame
//! decoding, and the blocking classifier catalogue on realistic server
//! pushes.

use serde_json::{json, Value};
use webtile_client::protocol::{decode_frame, parse_game_links};
use webtile_client::{
    classify, BlockingCondition, ClientMessage, InboundMessage, MessageKind, ProtocolVersion,
    WebtileError,
};

fn wire(msg: &ClientMessage) -> Value {
    serde_json::to_value(msg).unwrap()
}

fn inbound(value: Value) -> InboundMessage {
    InboundMessage::from_value(value).unwrap()
}

// ════════════════════════════════════════════════════════════════════
// Client requests
// ════════════════════════════════════════════════════════════════════

#[test]
fn every_request_variant() {
    let cases = [
        (
            ClientMessage::Login {
                username: "u".into(),
                password: "p".into(),
            },
            json!({"msg": "login", "username": "u", "password": "p"}),
        ),
        (
            ClientMessage::TokenLogin {
                cookie: "u%123".into(),
            },
            json!({"msg": "token_login", "cookie": "u%123"}),
        ),
        (
            ClientMessage::Register {
                username: "u".into(),
                password: "p".into(),
                email: Some("u@example.com".into()),
            },
            json!({"msg": "register", "username": "u", "password": "p", "email": "u@example.com"}),
        ),
        (
            ClientMessage::SetLoginCookie,
            json!({"msg": "set_login_cookie"}),
        ),
        (ClientMessage::GoLobby, json!({"msg": "go_lobby"})),
        (
            ClientMessage::Play {
                game_id: "dcss-web-trunk".into(),
            },
            json!({"msg": "play", "game_id": "dcss-web-trunk"}),
        ),
        (
            ClientMessage::GetRc {
                game_id: "g".into(),
            },
            json!({"msg": "get_rc", "game_id": "g"}),
        ),
        (
            ClientMessage::SetRc {
                game_id: "g".into(),
                contents: "show_more = false".into(),
            },
            json!({"msg": "set_rc", "game_id": "g", "contents": "show_more = false"}),
        ),
        (
            ClientMessage::Key { keycode: 27 },
            json!({"msg": "key", "keycode": 27}),
        ),
        (
            ClientMessage::Input { text: "i".into() },
            json!({"msg": "input", "text": "i"}),
        ),
        (ClientMessage::Pong, json!({"msg": "pong"})),
        (
            ClientMessage::BuildScenario {
                game_id: "g".into(),
                definition: "@".into(),
            },
            json!({"msg": "build_scenario", "game_id": "g", "definition": "@"}),
        ),
    ];

    for (message, expected) in cases {
        assert_eq!(wire(&message), expected, "{message:?}");
    }
}

// ════════════════════════════════════════════════════════════════════
// Inbound frames
// ════════════════════════════════════════════════════════════════════

#[test]
fn unknown_kinds_are_kept() {
    let mut messages = decode_frame(r#"{"msg":"update_spectators","count":2}"#);
    let message = messages.pop().unwrap().unwrap();
    assert!(messages.is_empty());
    assert_eq!(
        message.kind(),
        &MessageKind::Other("update_spectators".into())
    );
    assert_eq!(message.get("count"), Some(&json!(2)));
}

#[test]
fn batch_with_bad_entry_keeps_good_entries() {
    let items = decode_frame(
        r#"{"msgs":[{"msg":"map"},{"nope":1},{"msg":"player","hp":3},{"msg":3}]}"#,
    );
    let kinds: Vec<Option<String>> = items
        .iter()
        .map(|item| item.as_ref().ok().map(|m| m.msg().to_owned()))
        .collect();
    assert_eq!(
        kinds,
        [Some("map".to_owned()), None, Some("player".to_owned()), None]
    );
    assert!(items
        .iter()
        .filter_map(|item| item.as_ref().err())
        .all(|e| matches!(e, WebtileError::Protocol(_))));

    let items = decode_frame(r#"{"msgs":"map"}"#);
    assert!(matches!(items.as_slice(), [Err(WebtileError::Protocol(_))]));
}

#[test]
fn game_links_from_lobby_html() {
    let html = r##"<a href="#play-dcss-0.32">DCSS 0.32</a> <a href="#play-seeded-web-trunk">Seeded</a>"##;
    assert_eq!(parse_game_links(html), ["dcss-0.32", "seeded-web-trunk"]);
}

#[test]
fn versions_order() {
    let v29: ProtocolVersion = "0.29".parse().unwrap();
    let v32: ProtocolVersion = "0.32".parse().unwrap();
    let git: ProtocolVersion = "git".parse().unwrap();
    assert!(v29 < v32 && v32 < git);
}

// ════════════════════════════════════════════════════════════════════
// Blocking catalogue
// ════════════════════════════════════════════════════════════════════

#[test]
fn catalogue() {
    let use_item = |title: &str| json!({"msg": "menu", "tag": "use_item", "title": {"text": title}});
    let cases = [
        (json!({"msg": "input_mode", "mode": 5}), Some(BlockingCondition::More)),
        (json!({"msg": "input_mode", "mode": 7}), Some(BlockingCondition::TextInput)),
        (json!({"msg": "input_mode", "mode": 1}), None),
        (json!({"msg": "init_input", "type": "seed"}), Some(BlockingCondition::TextInput)),
        (
            json!({"msg": "ui-push", "type": "msgwin-get-line"}),
            Some(BlockingCondition::TextInput),
        ),
        (json!({"msg": "menu", "tag": "pickup"}), Some(BlockingCondition::Pickup)),
        (
            json!({"msg": "menu", "tag": "acquirement"}),
            Some(BlockingCondition::Acquirement),
        ),
        (json!({"msg": "menu", "tag": "skills"}), Some(BlockingCondition::Skill)),
        (
            use_item("Identify which item? (\\ to view known items)"),
            Some(BlockingCondition::Identify),
        ),
        (use_item("Enchant which weapon?"), Some(BlockingCondition::EnchantWeapon)),
        (use_item("Enchant which item?"), Some(BlockingCondition::EnchantItem)),
        (use_item("Brand which weapon?"), Some(BlockingCondition::BrandWeapon)),
        (use_item("Read which item?"), None),
        (json!({"msg": "menu", "tag": "inventory"}), None),
        (
            json!({"msg": "ui-push", "type": "seed-selection"}),
            Some(BlockingCondition::SeedSelection),
        ),
        (
            json!({"msg": "ui-push", "type": "newgame-choice"}),
            Some(BlockingCondition::NewGameChoice),
        ),
        (json!({"msg": "ui-push", "type": "describe-item"}), None),
        (
            json!({"msg": "msgs", "messages": [{"text": "You die..."}]}),
            Some(BlockingCondition::Died),
        ),
        (
            json!({"msg": "msgs", "messages": [{"text": "You hit the rat."}]}),
            None,
        ),
        (json!({"msg": "player", "hp": 3}), None),
    ];

    for (value, expected) in cases {
        assert_eq!(classify(&inbound(value.clone())).unwrap(), expected, "{value}");
    }
}

#[test]
fn blocking_error_messages() {
    assert_eq!(
        WebtileError::Blocking(BlockingCondition::More).to_string(),
        "Blocking due to 'more' message."
    );
    assert_eq!(
        WebtileError::from(BlockingCondition::Pickup).blocking(),
        Some(BlockingCondition::Pickup)
    );
    assert_eq!(WebtileError::Timeout.blocking(), None);
}
