//! Classification of "awaiting input" server states.
//!
//! A scripted caller cannot know in advance every prompt an action may open
//! (picking up one of several items spawns a disambiguation menu, a level up
//! may ask for an attribute). [`classify`] recognises those states so that
//! `read_until` can stop with a typed [`BlockingCondition`] instead of waiting
//! for a message that will never come.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::error::{Result, WebtileError};
use crate::protocol::{InboundMessage, MessageKind};

/// `input_mode` value for a "more" pagination prompt.
pub const INPUT_MODE_MORE: u64 = 5;
/// `input_mode` value for a text/choice prompt.
pub const INPUT_MODE_PROMPT: u64 = 7;
/// `input_mode` value meaning the game is ready for a free keystroke.
pub const INPUT_MODE_READY: u64 = 1;

const DEATH_TEXT: &str = "You die...";

/// Why a drain loop stopped without reaching its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum BlockingCondition {
    /// A "more" prompt must be dismissed.
    #[error("Blocking due to 'more' message.")]
    More,
    /// The game asks for typed text or a single-key choice (level-up
    /// attribute, yes/no confirmation, wizard-mode prompts).
    #[error("Blocking due to a text input prompt.")]
    TextInput,
    /// Several items lie on the tile; pick which to take.
    #[error("Blocking due to a pickup menu popup.")]
    Pickup,
    #[error("Blocking due to a 'acquirement' menu popup.")]
    Acquirement,
    #[error("Blocking due to a 'identify' menu popup.")]
    Identify,
    #[error("Blocking due to a 'enchant weapon' menu popup.")]
    EnchantWeapon,
    #[error("Blocking due to a 'enchant item' menu popup.")]
    EnchantItem,
    #[error("Blocking due to a 'brand weapon' menu popup.")]
    BrandWeapon,
    /// The skill selection menu is open.
    #[error("Blocking due to a skill selection menu popup.")]
    Skill,
    /// New game: the seed selection screen is open.
    #[error("Blocking due to the seed selection screen.")]
    SeedSelection,
    /// New game: a species/background/weapon choice is open.
    #[error("Blocking due to a new game choice screen.")]
    NewGameChoice,
    /// The character died. The game must be quit.
    #[error("Character died.")]
    Died,
}

#[derive(Deserialize)]
struct InputMode {
    mode: u64,
}

#[derive(Deserialize)]
struct Menu {
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    title: Option<MenuTitle>,
}

#[derive(Deserialize)]
struct MenuTitle {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct UiPush {
    #[serde(rename = "type", default)]
    ui_type: Option<String>,
}

#[derive(Deserialize)]
struct Msgs {
    #[serde(default)]
    messages: Vec<LogLine>,
}

#[derive(Deserialize)]
struct LogLine {
    #[serde(default)]
    text: Option<String>,
}

/// Classify one message against the blocking catalogue.
///
/// Returns `Ok(None)` for messages that do not signal a blocking state, and a
/// [`WebtileError::Protocol`] when a message of a classified kind is missing
/// or mistypes the fields the decision depends on.
pub fn classify(message: &InboundMessage) -> Result<Option<BlockingCondition>> {
    let condition = match message.kind() {
        MessageKind::InputMode => {
            let InputMode { mode } = shape(message)?;
            match mode {
                INPUT_MODE_MORE => Some(BlockingCondition::More),
                INPUT_MODE_PROMPT => Some(BlockingCondition::TextInput),
                _ => None,
            }
        }
        MessageKind::InitInput => Some(BlockingCondition::TextInput),
        MessageKind::Menu => classify_menu(shape(message)?),
        MessageKind::UiPush => {
            let UiPush { ui_type } = shape(message)?;
            match ui_type.as_deref() {
                Some("seed-selection") => Some(BlockingCondition::SeedSelection),
                Some("newgame-choice") => Some(BlockingCondition::NewGameChoice),
                Some("msgwin-get-line") => Some(BlockingCondition::TextInput),
                _ => None,
            }
        }
        MessageKind::Msgs => {
            let Msgs { messages } = shape(message)?;
            messages
                .iter()
                .filter_map(|line| line.text.as_deref())
                .any(|text| text.contains(DEATH_TEXT))
                .then_some(BlockingCondition::Died)
        }
        _ => None,
    };
    Ok(condition)
}

fn classify_menu(menu: Menu) -> Option<BlockingCondition> {
    match menu.tag.as_deref() {
        Some("pickup") => Some(BlockingCondition::Pickup),
        Some("acquirement") => Some(BlockingCondition::Acquirement),
        Some("skills") => Some(BlockingCondition::Skill),
        Some("use_item") => {
            let title = menu.title.map(|t| t.text).unwrap_or_default();
            if title.contains("Identify which item?") {
                Some(BlockingCondition::Identify)
            } else if title.contains("Enchant which weapon?") {
                Some(BlockingCondition::EnchantWeapon)
            } else if title.contains("Enchant which item?") {
                Some(BlockingCondition::EnchantItem)
            } else if title.contains("Brand which weapon?") {
                Some(BlockingCondition::BrandWeapon)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn shape<T: for<'de> Deserialize<'de>>(message: &InboundMessage) -> Result<T> {
    T::deserialize(message.as_value()).map_err(|e| {
        WebtileError::Protocol(format!("malformed `{}` message: {e}", message.msg()))
    })
}

/// Whether a `msgs` push announces exactly the given seed (`"Game seed: N"`).
pub fn announces_seed(message: &InboundMessage, seed: &str) -> bool {
    message.kind() == &MessageKind::Msgs
        && message
            .get("messages")
            .and_then(Value::as_array)
            .is_some_and(|lines| {
                lines
                    .iter()
                    .filter_map(|line| line.get("text").and_then(Value::as_str))
                    .flat_map(|text| text.split("Game seed: ").skip(1))
                    .any(|rest| rest.split(|c: char| !c.is_ascii_digit()).next() == Some(seed))
            })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(value: Value) -> InboundMessage {
        InboundMessage::from_value(value).unwrap()
    }

    fn kind_of(value: Value) -> Option<BlockingCondition> {
        classify(&msg(value)).unwrap()
    }

    #[test]
    fn input_modes() {
        assert_eq!(
            kind_of(json!({"msg": "input_mode", "mode": 5})),
            Some(BlockingCondition::More)
        );
        assert_eq!(
            kind_of(json!({"msg": "input_mode", "mode": 7})),
            Some(BlockingCondition::TextInput)
        );
        assert_eq!(kind_of(json!({"msg": "input_mode", "mode": 1})), None);
        assert_eq!(kind_of(json!({"msg": "input_mode", "mode": 0})), None);
    }

    #[test]
    fn input_mode_without_numeric_mode_is_protocol_error() {
        let err = classify(&msg(json!({"msg": "input_mode", "mode": "five"}))).unwrap_err();
        assert!(matches!(err, WebtileError::Protocol(_)));
        let err = classify(&msg(json!({"msg": "input_mode"}))).unwrap_err();
        assert!(matches!(err, WebtileError::Protocol(_)));
    }

    #[test]
    fn menu_tags() {
        assert_eq!(
            kind_of(json!({"msg": "menu", "tag": "pickup"})),
            Some(BlockingCondition::Pickup)
        );
        assert_eq!(
            kind_of(json!({"msg": "menu", "tag": "acquirement"})),
            Some(BlockingCondition::Acquirement)
        );
        assert_eq!(
            kind_of(json!({"msg": "menu", "tag": "skills"})),
            Some(BlockingCondition::Skill)
        );
        assert_eq!(kind_of(json!({"msg": "menu", "tag": "inventory"})), None);
        assert_eq!(kind_of(json!({"msg": "menu"})), None);
    }

    #[test]
    fn use_item_menus_by_title() {
        let cases = [
            ("Identify which item? (\\ to view known items)", BlockingCondition::Identify),
            ("Enchant which weapon?", BlockingCondition::EnchantWeapon),
            ("Enchant which item?", BlockingCondition::EnchantItem),
            ("Brand which weapon?", BlockingCondition::BrandWeapon),
        ];
        for (title, expected) in cases {
            assert_eq!(
                kind_of(json!({"msg": "menu", "tag": "use_item", "title": {"text": title}})),
                Some(expected),
                "{title}"
            );
        }
        assert_eq!(
            kind_of(json!({"msg": "menu", "tag": "use_item", "title": {"text": "Wield which item?"}})),
            None
        );
    }

    #[test]
    fn ui_push_types() {
        assert_eq!(
            kind_of(json!({"msg": "ui-push", "type": "seed-selection"})),
            Some(BlockingCondition::SeedSelection)
        );
        assert_eq!(
            kind_of(json!({"msg": "ui-push", "type": "newgame-choice"})),
            Some(BlockingCondition::NewGameChoice)
        );
        assert_eq!(
            kind_of(json!({"msg": "ui-push", "type": "msgwin-get-line"})),
            Some(BlockingCondition::TextInput)
        );
        assert_eq!(kind_of(json!({"msg": "ui-push", "type": "describe-item"})), None);
        assert_eq!(
            kind_of(json!({"msg": "init_input", "type": "messagebox"})),
            Some(BlockingCondition::TextInput)
        );
    }

    #[test]
    fn death_in_log() {
        assert_eq!(
            kind_of(json!({"msg": "msgs", "messages": [
                {"text": "The orc hits you!"},
                {"text": "You die..."}
            ]})),
            Some(BlockingCondition::Died)
        );
        assert_eq!(
            kind_of(json!({"msg": "msgs", "messages": [{"text": "Welcome, Username."}]})),
            None
        );
        assert_eq!(kind_of(json!({"msg": "msgs", "old_msgs": 3})), None);
    }

    #[test]
    fn log_lines_without_text_are_skipped() {
        assert_eq!(
            kind_of(json!({"msg": "msgs", "messages": [{"text": null}, {"channel": 2}]})),
            None
        );
        assert_eq!(
            kind_of(json!({"msg": "msgs", "messages": [{"text": null}, {"text": "You die..."}]})),
            Some(BlockingCondition::Died)
        );
    }

    #[test]
    fn unrelated_kinds_never_block() {
        for value in [
            json!({"msg": "map", "cells": []}),
            json!({"msg": "player", "wizard": 0}),
            json!({"msg": "go_lobby"}),
            json!({"msg": "update_spectators", "count": 2}),
        ] {
            assert_eq!(kind_of(value), None);
        }
    }

    #[test]
    fn seed_announcement() {
        let m = msg(json!({"msg": "msgs", "messages": [
            {"text": "Welcome, Username the Minotaur Berserker."},
            {"text": "Game seed: 158985 (custom seed)"}
        ]}));
        assert!(announces_seed(&m, "158985"));
        assert!(!announces_seed(&m, "1"));
        assert!(!announces_seed(&msg(json!({"msg": "map"})), "158985"));
    }
}
