//! Wire types for the Webtile protocol.
//!
//! Every frame is a JSON object carrying a `msg` discriminator. Requests are
//! modelled as the serde-tagged [`ClientMessage`] enum; inbound traffic is
//! kept as raw JSON (the server attaches many fields this client never
//! interprets) wrapped in an [`InboundMessage`] whose discriminator is parsed
//! into the closed [`MessageKind`] enum.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConnectionError, Result, WebtileError};

/// Opaque name of a playable server-side game configuration
/// (e.g. `"dcss-web-trunk"`).
pub type GameId = String;

// ── Protocol version ────────────────────────────────────────────────

/// Server release the session talks to, as given at connect time.
///
/// Parsed from `"<major>.<minor>"` (e.g. `"0.32"`); `"trunk"` and `"git"`
/// denote the development branch and order after every release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolVersion {
    /// A numbered release.
    Release { major: u32, minor: u32 },
    /// The development branch.
    Trunk,
}

impl FromStr for ProtocolVersion {
    type Err = ConnectionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let tag = s.trim();
        if tag.eq_ignore_ascii_case("trunk") || tag.eq_ignore_ascii_case("git") {
            return Ok(Self::Trunk);
        }
        let invalid = || ConnectionError::InvalidVersion(s.to_owned());
        let (major, minor) = tag.split_once('.').ok_or_else(invalid)?;
        Ok(Self::Release {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Release { major, minor } => write!(f, "{major}.{minor}"),
            Self::Trunk => f.write_str("trunk"),
        }
    }
}

// ── Client messages ─────────────────────────────────────────────────

/// Requests sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Log in with a username and password.
    Login { username: String, password: String },
    /// Log in with a cookie previously minted by `SetLoginCookie`.
    TokenLogin { cookie: String },
    /// Create an account; on success the session is logged in as it.
    Register {
        username: String,
        password: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
    /// Mint a new login cookie for the logged-in user.
    SetLoginCookie,
    /// Return to (or refresh) the lobby.
    GoLobby,
    /// Start or resume a game.
    Play { game_id: GameId },
    /// Request the RC file of a game.
    GetRc { game_id: GameId },
    /// Overwrite the RC file of a game.
    SetRc { game_id: GameId, contents: String },
    /// A key press identified by keycode.
    Key { keycode: i32 },
    /// Literal text input.
    Input { text: String },
    /// Reply to a server `ping`.
    Pong,
    /// Hand a scenario definition to the scenario service.
    BuildScenario { game_id: GameId, definition: String },
}

// ── Server messages ─────────────────────────────────────────────────

/// Discriminator of an inbound message.
///
/// Kinds the client acts on are named variants; everything else the server
/// sends is carried by [`MessageKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Ping,
    LobbyClear,
    LobbyComplete,
    LoginSuccess,
    LoginFail,
    RegisterFail,
    LoginCookie,
    SetGameLinks,
    GoLobby,
    GameStarted,
    RcfileContents,
    Msgs,
    Player,
    Map,
    InputMode,
    InitInput,
    CloseInput,
    Menu,
    UpdateMenu,
    CloseMenu,
    UiPush,
    UiPop,
    UiStateSync,
    ScenarioReady,
    ScenarioError,
    Other(String),
}

impl MessageKind {
    /// Parse a wire discriminator.
    pub fn from_wire(msg: &str) -> Self {
        match msg {
            "ping" => Self::Ping,
            "lobby_clear" => Self::LobbyClear,
            "lobby_complete" => Self::LobbyComplete,
            "login_success" => Self::LoginSuccess,
            "login_fail" => Self::LoginFail,
            "register_fail" => Self::RegisterFail,
            "login_cookie" => Self::LoginCookie,
            "set_game_links" => Self::SetGameLinks,
            "go_lobby" => Self::GoLobby,
            "game_started" => Self::GameStarted,
            "rcfile_contents" => Self::RcfileContents,
            "msgs" => Self::Msgs,
            "player" => Self::Player,
            "map" => Self::Map,
            "input_mode" => Self::InputMode,
            "init_input" => Self::InitInput,
            "close_input" => Self::CloseInput,
            "menu" => Self::Menu,
            "update_menu" => Self::UpdateMenu,
            "close_menu" => Self::CloseMenu,
            "ui-push" => Self::UiPush,
            "ui-pop" => Self::UiPop,
            "ui-state-sync" => Self::UiStateSync,
            "scenario_ready" => Self::ScenarioReady,
            "scenario_error" => Self::ScenarioError,
            other => Self::Other(other.to_owned()),
        }
    }

    /// The wire discriminator.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ping => "ping",
            Self::LobbyClear => "lobby_clear",
            Self::LobbyComplete => "lobby_complete",
            Self::LoginSuccess => "login_success",
            Self::LoginFail => "login_fail",
            Self::RegisterFail => "register_fail",
            Self::LoginCookie => "login_cookie",
            Self::SetGameLinks => "set_game_links",
            Self::GoLobby => "go_lobby",
            Self::GameStarted => "game_started",
            Self::RcfileContents => "rcfile_contents",
            Self::Msgs => "msgs",
            Self::Player => "player",
            Self::Map => "map",
            Self::InputMode => "input_mode",
            Self::InitInput => "init_input",
            Self::CloseInput => "close_input",
            Self::Menu => "menu",
            Self::UpdateMenu => "update_menu",
            Self::CloseMenu => "close_menu",
            Self::UiPush => "ui-push",
            Self::UiPop => "ui-pop",
            Self::UiStateSync => "ui-state-sync",
            Self::ScenarioReady => "scenario_ready",
            Self::ScenarioError => "scenario_error",
            Self::Other(other) => other,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message received from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    kind: MessageKind,
    raw: Value,
}

impl InboundMessage {
    /// Wrap a JSON value. It must be an object with a string `msg` field.
    pub fn from_value(raw: Value) -> Result<Self> {
        let kind = match raw.get("msg") {
            Some(Value::String(msg)) => MessageKind::from_wire(msg),
            Some(other) => {
                return Err(WebtileError::Protocol(format!(
                    "`msg` discriminator is not a string: {other}"
                )))
            }
            None => {
                return Err(WebtileError::Protocol(format!(
                    "message without `msg` discriminator: {raw}"
                )))
            }
        };
        Ok(Self { kind, raw })
    }

    /// The parsed discriminator.
    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// The raw `msg` discriminator.
    pub fn msg(&self) -> &str {
        self.kind.as_str()
    }

    /// A field of the message, if present.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.raw.get(field)
    }

    /// A string field of the message, if present and a string.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.raw.get(field).and_then(Value::as_str)
    }

    /// The whole message as JSON.
    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    /// Consume the message, returning its JSON.
    pub fn into_value(self) -> Value {
        self.raw
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Decode one text frame into its messages.
///
/// The server batches pushes as `{"msgs":[...]}`; such frames yield their
/// entries in order, each decoded on its own so that one malformed entry
/// does not hide its neighbours. Any other frame is a single message.
pub fn decode_frame(text: &str) -> Vec<Result<InboundMessage>> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return vec![Err(WebtileError::Protocol(format!("frame is not JSON: {e}")))],
    };
    let is_batch = value.get("msg").is_none() && value.get("msgs").is_some();
    if !is_batch {
        return vec![InboundMessage::from_value(value)];
    }
    match value {
        Value::Object(mut map) => match map.remove("msgs") {
            Some(Value::Array(entries)) => entries
                .into_iter()
                .map(InboundMessage::from_value)
                .collect(),
            _ => vec![Err(WebtileError::Protocol(
                "`msgs` batch is not an array".to_owned(),
            ))],
        },
        _ => vec![Err(WebtileError::Protocol(
            "frame is not an object".to_owned(),
        ))],
    }
}

/// Extract game IDs from the `content` HTML of a `set_game_links` push.
///
/// Links look like `<a href="#play-dcss-web-trunk">`; order is preserved.
pub fn parse_game_links(content: &str) -> Vec<GameId> {
    content
        .split("#play-")
        .skip(1)
        .filter_map(|link| link.split('"').next())
        .filter(|id| !id.is_empty())
        .map(ToOwned::to_owned)
        .collect()
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

    #[test]
    fn version_parses_release_and_trunk() {
        assert_eq!(
            "0.32".parse::<ProtocolVersion>().unwrap(),
            ProtocolVersion::Release {
                major: 0,
                minor: 32
            }
        );
        assert_eq!(
            "trunk".parse::<ProtocolVersion>().unwrap(),
            ProtocolVersion::Trunk
        );
        assert!("0.29".parse::<ProtocolVersion>().unwrap() < "0.32".parse().unwrap());
        assert!("0.32".parse::<ProtocolVersion>().unwrap() < ProtocolVersion::Trunk);
    }

    #[test]
    fn version_rejects_garbage() {
        for bad in ["", "32", "0.x", "a.b.c", "v0.32"] {
            let err = bad.parse::<ProtocolVersion>().unwrap_err();
            assert!(matches!(err, ConnectionError::InvalidVersion(_)), "{bad}");
        }
    }

    #[test]
    fn client_messages_use_msg_tag() {
        let login = ClientMessage::Login {
            username: "Username".into(),
            password: "Password".into(),
        };
        assert_eq!(
            serde_json::to_value(&login).unwrap(),
            json!({"msg": "login", "username": "Username", "password": "Password"})
        );
        assert_eq!(
            serde_json::to_value(ClientMessage::SetLoginCookie).unwrap(),
            json!({"msg": "set_login_cookie"})
        );
        assert_eq!(
            serde_json::to_value(ClientMessage::Register {
                username: "u".into(),
                password: "p".into(),
                email: None,
            })
            .unwrap(),
            json!({"msg": "register", "username": "u", "password": "p"})
        );
    }

    #[test]
    fn message_kind_round_trips_wire_names() {
        for wire in ["ping", "login_success", "ui-push", "ui-state-sync", "map"] {
            let kind = MessageKind::from_wire(wire);
            assert!(!matches!(kind, MessageKind::Other(_)));
            assert_eq!(kind.as_str(), wire);
        }
        assert_eq!(
            MessageKind::from_wire("update_spectators"),
            MessageKind::Other("update_spectators".into())
        );
    }

    #[test]
    fn decode_single_and_batched_frames() {
        let single = decode_frame(r#"{"msg":"ping"}"#);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].as_ref().unwrap().kind(), &MessageKind::Ping);

        let kinds: Vec<_> = decode_frame(r#"{"msgs":[{"msg":"lobby_clear"},{"msg":"lobby_complete"}]}"#)
            .into_iter()
            .map(|m| m.unwrap().msg().to_owned())
            .collect();
        assert_eq!(kinds, ["lobby_clear", "lobby_complete"]);
    }

    #[test]
    fn decode_rejects_frames_without_discriminator() {
        for bad in [r#"{"hello":1}"#, r#"{"msg":3}"#, "not json", r#"{"msgs":"map"}"#, "[1]"] {
            let items = decode_frame(bad);
            assert_eq!(items.len(), 1, "{bad}");
            assert!(matches!(items[0], Err(WebtileError::Protocol(_))), "{bad}");
        }
    }

    #[test]
    fn bad_batch_entry_keeps_its_neighbours() {
        let items = decode_frame(r#"{"msgs":[{"msg":"login_success"},{"msg":3},{"msg":"go_lobby"}]}"#);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().kind(), &MessageKind::LoginSuccess);
        assert!(matches!(items[1], Err(WebtileError::Protocol(_))));
        assert_eq!(items[2].as_ref().unwrap().kind(), &MessageKind::GoLobby);
    }

    #[test]
    fn game_links_keep_server_order() {
        let html = concat!(
            r##"<a href="#play-dcss-web-trunk">Play trunk</a><br>"##,
            r##"<a href="#play-seeded-web-trunk">Seeded</a><br>"##,
            r##"<a href="#play-tut-web-trunk">Tutorial</a>"##,
        );
        assert_eq!(
            parse_game_links(html),
            ["dcss-web-trunk", "seeded-web-trunk", "tut-web-trunk"]
        );
        assert!(parse_game_links("<p>no games</p>").is_empty());
    }
}
