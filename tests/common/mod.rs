#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Webtile client integration tests.
//!
//! Provides a scripted [`MockTransport`], an in-memory [`loopback`] transport
//! pair, and [`FakeServer`]: an in-process Webtile server with accounts,
//! login cookies, RC files, saves, the new game screens and a scenario
//! service. The fake server can be reached through a loopback transport
//! ([`FakeServer::connect`]) or over a real WebSocket ([`FakeServer::listen`]).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use webtile_client::{Transport, WebtileClient, WebtileConfig, WebtileError};

// ── MockTransport ───────────────────────────────────────────────────

/// A scripted mock transport.
///
/// Scripted server frames are consumed in order by `recv()`, after which it
/// hangs so the transport loop stays alive until shutdown. All frames sent by
/// the client are recorded in `sent`.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, WebtileError>>>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a mock transport with raw scripted `recv()` results.
    pub fn new(
        incoming: Vec<Option<Result<String, WebtileError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }

    /// Create a mock transport replaying the given JSON frames.
    pub fn frames(frames: Vec<Value>) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        Self::new(
            frames
                .into_iter()
                .map(|frame| Some(Ok(frame.to_string())))
                .collect(),
        )
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), WebtileError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, WebtileError>> {
        match self.incoming.pop_front() {
            Some(item) => item,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), WebtileError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// Parse the frames a [`MockTransport`] recorded.
pub fn sent_json(sent: &Arc<StdMutex<Vec<String>>>) -> Vec<Value> {
    sent.lock()
        .unwrap()
        .iter()
        .map(|frame| serde_json::from_str(frame).unwrap())
        .collect()
}

// ── Loopback transport ──────────────────────────────────────────────

/// One end of an in-memory transport pair.
pub struct LoopbackTransport {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
}

/// Two connected in-memory transports.
pub fn loopback() -> (LoopbackTransport, LoopbackTransport) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        LoopbackTransport {
            tx: Some(a_tx),
            rx: a_rx,
        },
        LoopbackTransport {
            tx: Some(b_tx),
            rx: b_rx,
        },
    )
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), WebtileError> {
        let tx = self.tx.as_ref().ok_or(WebtileError::TransportClosed)?;
        tx.send(message)
            .map_err(|_| WebtileError::TransportSend("peer is gone".into()))
    }

    async fn recv(&mut self) -> Option<Result<String, WebtileError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), WebtileError> {
        self.tx = None;
        Ok(())
    }
}

// ── Config ──────────────────────────────────────────────────────────

/// Session configuration with a short wait budget.
pub fn test_config() -> WebtileConfig {
    WebtileConfig::new("0.32")
        .unwrap()
        .with_read_timeout(Duration::from_secs(2))
}

// ── Fake server ─────────────────────────────────────────────────────

pub const USERNAME: &str = "Username";
pub const PASSWORD: &str = "Password";

/// Games offered by the fake server, in lobby order.
pub const GAME_IDS: [&str; 3] = ["dcss-web-trunk", "seeded-web-trunk", "tut-web-trunk"];

/// Seed announced for games started without a fixed seed.
pub const RANDOM_SEED_ANNOUNCED: &str = "158985";

const MAX_MAP_WIDTH: usize = 79;
const MAX_MAP_HEIGHT: usize = 69;

const KEYCODE_CTRL_Q: i64 = 17;
const KEYCODE_CTRL_S: i64 = 19;
const KEYCODE_ENTER: i64 = 13;
const KEYCODE_ESC: i64 = 27;

fn game_links_html() -> String {
    GAME_IDS
        .iter()
        .map(|id| format!(r##"<a href="#play-{id}">Play {id}</a><br>"##))
        .collect()
}

/// An in-process Webtile server. Clones share state.
#[derive(Clone, Default)]
pub struct FakeServer {
    state: Arc<StdMutex<ServerState>>,
}

#[derive(Default)]
struct ServerState {
    accounts: HashMap<String, String>,
    /// Current cookie token per account; minting a new one replaces it.
    cookies: HashMap<String, u64>,
    minted: u64,
    rc_files: HashMap<(String, String), String>,
    saves: HashSet<(String, String)>,
    received: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Lobby,
    SeedMenu,
    SeedEntry,
    SeedConfirm,
    Choosing,
    Playing,
    QuitPrompt,
    QuitMore,
}

/// Per-connection state.
#[derive(Default)]
struct Connection {
    username: Option<String>,
    game: Option<String>,
    phase: Phase,
    seed: Option<String>,
    pregenerate: bool,
    choices: Vec<String>,
    turn: u64,
}

impl FakeServer {
    /// A server with the `Username`/`Password` account.
    pub fn new() -> Self {
        let server = Self::default();
        server.add_account(USERNAME, PASSWORD);
        server
    }

    pub fn add_account(&self, username: &str, password: &str) {
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(username.into(), password.into());
    }

    pub fn has_save(&self, username: &str, game_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .saves
            .contains(&(username.to_owned(), game_id.to_owned()))
    }

    /// Every client request received so far, across connections.
    pub fn received(&self) -> Vec<Value> {
        self.state.lock().unwrap().received.clone()
    }

    /// Start a session against this server over an in-memory transport.
    pub fn connect(&self, config: WebtileConfig) -> WebtileClient {
        let (client_side, server_side) = loopback();
        tokio::spawn(self.clone().serve(server_side));
        WebtileClient::start(client_side, config)
    }

    /// Accept WebSocket connections on a local port. Returns the URL.
    #[cfg(feature = "transport-websocket")]
    pub async fn listen(&self) -> String {
        use tokio::net::TcpListener;
        use tokio_tungstenite::MaybeTlsStream;
        use webtile_client::WebSocketTransport;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = self.clone();

        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let server = server.clone();
                tokio::spawn(async move {
                    let Ok(ws) = tokio_tungstenite::accept_async(MaybeTlsStream::Plain(tcp)).await
                    else {
                        return;
                    };
                    server.serve(WebSocketTransport::from_stream(ws)).await;
                });
            }
        });

        format!("ws://{addr}/socket")
    }

    async fn serve(self, mut transport: impl Transport) {
        let greeting = [
            json!({"msg": "ping"}),
            json!({"msgs": [{"msg": "lobby_clear"}, {"msg": "lobby_complete"}]}),
        ];
        for frame in greeting {
            if transport.send(frame.to_string()).await.is_err() {
                return;
            }
        }

        let mut connection = Connection::default();
        while let Some(Ok(text)) = transport.recv().await {
            let Ok(request) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            for reply in self.handle(&mut connection, request) {
                if transport.send(reply.to_string()).await.is_err() {
                    return;
                }
            }
        }
    }

    fn handle(&self, conn: &mut Connection, request: Value) -> Vec<Value> {
        let mut state = self.state.lock().unwrap();
        state.received.push(request.clone());

        let field = |name: &str| request[name].as_str().unwrap_or_default().to_owned();
        match request["msg"].as_str().unwrap_or_default() {
            "login" => {
                let username = field("username");
                if state.accounts.get(&username) == Some(&field("password")) {
                    login(conn, &username)
                } else {
                    vec![json!({"msg": "login_fail"})]
                }
            }
            "token_login" => {
                let cookie = field("cookie");
                let valid = cookie.split_once('%').and_then(|(username, token)| {
                    let token: u64 = token.parse().ok()?;
                    (state.cookies.get(username) == Some(&token)).then(|| username.to_owned())
                });
                match valid {
                    Some(username) => login(conn, &username),
                    None => vec![json!({"msg": "login_fail"})],
                }
            }
            "register" => {
                let username = field("username");
                if state.accounts.contains_key(&username) {
                    vec![json!({"msg": "register_fail", "reason": "Account already exists!"})]
                } else {
                    state.accounts.insert(username.clone(), field("password"));
                    login(conn, &username)
                }
            }
            "set_login_cookie" => match &conn.username {
                Some(username) => {
                    state.minted += 1;
                    let token = state.minted * 7_919 + 104_729;
                    state.cookies.insert(username.clone(), token);
                    vec![json!({"msg": "login_cookie", "cookie": format!("{username}%{token}"), "expires": 7})]
                }
                None => vec![],
            },
            "go_lobby" => {
                conn.phase = Phase::Lobby;
                vec![json!({"msg": "go_lobby"})]
            }
            "get_rc" => {
                let key = (conn.username.clone().unwrap_or_default(), field("game_id"));
                let contents = state.rc_files.get(&key).cloned().unwrap_or_default();
                vec![json!({"msg": "rcfile_contents", "contents": contents})]
            }
            "set_rc" => {
                let key = (conn.username.clone().unwrap_or_default(), field("game_id"));
                state.rc_files.insert(key, field("contents"));
                vec![]
            }
            "build_scenario" => match validate_scenario(&field("definition")) {
                Ok(()) => vec![json!({"msg": "scenario_ready", "game_id": field("game_id")})],
                Err(error) => vec![json!({"msg": "scenario_error", "error": error})],
            },
            "play" => {
                let Some(username) = conn.username.clone() else {
                    return vec![json!({"msg": "go_lobby"})];
                };
                let game_id = field("game_id");
                conn.game = Some(game_id.clone());
                conn.seed = None;
                conn.choices.clear();
                if state.saves.contains(&(username, game_id.clone())) {
                    conn.phase = Phase::Playing;
                    vec![
                        json!({"msg": "game_started"}),
                        json!({"msg": "map", "clear": true, "cells": []}),
                        json!({"msg": "input_mode", "mode": 1}),
                    ]
                } else if game_id.starts_with("seeded") {
                    conn.phase = Phase::SeedMenu;
                    vec![json!({"msg": "ui-push", "type": "seed-selection"})]
                } else {
                    conn.phase = Phase::Choosing;
                    vec![newgame_choice(0)]
                }
            }
            "key" => {
                let keycode = request["keycode"].as_i64().unwrap_or_default();
                on_key(&mut state, conn, keycode)
            }
            "input" => on_input(&mut state, conn, &field("text")),
            _ => vec![],
        }
    }
}

fn login(conn: &mut Connection, username: &str) -> Vec<Value> {
    conn.username = Some(username.to_owned());
    conn.phase = Phase::Lobby;
    vec![
        json!({"admin": false, "msg": "login_success", "username": username}),
        json!({"msg": "set_game_links", "content": game_links_html()}),
    ]
}

fn newgame_choice(step: usize) -> Value {
    let title = ["species", "background", "weapon"]
        .get(step)
        .copied()
        .unwrap_or("unknown");
    json!({"msg": "ui-push", "type": "newgame-choice", "title": title})
}

fn on_key(state: &mut ServerState, conn: &mut Connection, keycode: i64) -> Vec<Value> {
    match (conn.phase, keycode) {
        (Phase::Playing, KEYCODE_CTRL_S) => {
            conn.phase = Phase::Lobby;
            vec![json!({"msg": "go_lobby"})]
        }
        (Phase::Playing, KEYCODE_CTRL_Q) => {
            conn.phase = Phase::QuitPrompt;
            vec![
                json!({"msg": "msgs", "messages": [{"text": "Are you sure you want to abandon this character and quit the game?"}]}),
                json!({"msg": "input_mode", "mode": 7}),
            ]
        }
        (Phase::Playing, KEYCODE_ESC) => {
            vec![json!({"msg": "close_menu"}), json!({"msg": "input_mode", "mode": 1})]
        }
        (Phase::QuitPrompt, KEYCODE_ENTER) => {
            if let (Some(username), Some(game)) = (&conn.username, &conn.game) {
                state.saves.remove(&(username.clone(), game.clone()));
            }
            conn.phase = Phase::QuitMore;
            vec![
                json!({"msg": "close_input"}),
                json!({"msg": "msgs", "messages": [{"text": "You die..."}]}),
                json!({"msg": "input_mode", "mode": 5}),
            ]
        }
        (Phase::QuitMore, KEYCODE_ESC) => {
            conn.phase = Phase::Lobby;
            vec![json!({"msg": "go_lobby"})]
        }
        _ => vec![],
    }
}

fn on_input(state: &mut ServerState, conn: &mut Connection, text: &str) -> Vec<Value> {
    match conn.phase {
        Phase::SeedMenu if text == "-" => {
            conn.phase = Phase::SeedEntry;
            vec![json!({"msg": "ui-state-sync", "widget_id": "seed", "text": ""})]
        }
        Phase::SeedEntry => {
            conn.seed = Some(text.to_owned());
            conn.phase = Phase::SeedConfirm;
            vec![]
        }
        Phase::SeedConfirm => {
            conn.pregenerate = text != "\r";
            conn.phase = Phase::Choosing;
            vec![json!({"msg": "ui-pop"}), newgame_choice(0)]
        }
        Phase::Choosing => {
            conn.choices.push(text.to_owned());
            if conn.choices.len() < 3 {
                return vec![newgame_choice(conn.choices.len())];
            }
            if let (Some(username), Some(game)) = (&conn.username, &conn.game) {
                state.saves.insert((username.clone(), game.clone()));
            }
            conn.phase = Phase::Playing;
            let seed = conn
                .seed
                .clone()
                .unwrap_or_else(|| RANDOM_SEED_ANNOUNCED.to_owned());
            vec![
                json!({"msg": "ui-pop"}),
                json!({"msg": "game_started"}),
                json!({"msg": "msgs", "messages": [
                    {"text": "Welcome, Username."},
                    {"text": format!("Game seed: {seed}")}
                ]}),
                json!({"msg": "map", "clear": true, "cells": []}),
                json!({"msg": "input_mode", "mode": 1}),
            ]
        }
        Phase::Playing if text == "g" || text == "," => vec![
            json!({"msg": "msgs", "messages": [{"text": "There are several objects here."}]}),
            json!({"msg": "menu", "tag": "pickup", "title": {"text": "Pick up what?"}}),
        ],
        Phase::Playing => {
            conn.turn += 1;
            vec![
                json!({"msg": "player", "turn": conn.turn}),
                json!({"msg": "input_mode", "mode": 1}),
            ]
        }
        Phase::QuitPrompt => vec![json!({"msg": "update_input", "text": text})],
        _ => vec![],
    }
}

/// The scenario service's checks.
fn validate_scenario(definition: &str) -> Result<(), String> {
    let rows: Vec<&str> = definition.lines().collect();
    if rows.iter().any(|row| row.chars().count() > MAX_MAP_WIDTH) {
        return Err(format!("map is wider than {MAX_MAP_WIDTH} columns"));
    }
    if rows.len() > MAX_MAP_HEIGHT {
        return Err(format!("map is taller than {MAX_MAP_HEIGHT} rows"));
    }
    if !definition.contains('@') {
        return Err("missing start marker '@' in map".to_owned());
    }
    Ok(())
}
