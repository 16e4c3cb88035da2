//! Webtile session client.
//!
//! [`WebtileClient`] owns one connection. A background transport loop task
//! decodes inbound frames onto an unbounded queue and writes outgoing frames
//! queued by the handle. Callers drain the queue with [`read_until`], which
//! stops at the first message matching a [`Target`] or fails with a
//! [`BlockingCondition`](crate::BlockingCondition) when the server starts
//! waiting for input the caller did not plan for.
//!
//! Every message a drain loop looks at is also kept in a backlog, so the
//! caller can still process it afterwards with [`poll_message`].
//!
//! [`read_until`]: WebtileClient::read_until
//! [`poll_message`]: WebtileClient::poll_message
//!
//! # Example
//!
//! ```rust,ignore
//! let config = WebtileConfig::new("0.32")?;
//! let mut client = WebtileClient::connect("ws://localhost:8080/socket", config).await?;
//! client.await_ready().await?;
//!
//! let games = client.login_with_credentials("Username", "Password").await?;
//! client.start_game(&games[0], "b", "f", "b").await?;
//!
//! client.write_key("key_dir_n")?;
//! match client.read_until("player").await {
//!     Ok(_) => {}
//!     Err(WebtileError::Blocking(BlockingCondition::More)) => client.write_key("key_esc")?,
//!     Err(e) => return Err(e),
//! }
//!
//! while let Some(message) = client.poll_message() {
//!     println!("{message}");
//! }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::blocking::classify;
use crate::error::{Result, WebtileError};
use crate::keys::key_message;
use crate::protocol::{
    decode_frame, ClientMessage, GameId, InboundMessage, MessageKind, ProtocolVersion,
};
use crate::transport::Transport;

/// Default wait budget of a drain loop.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`WebtileClient`] session.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use webtile_client::client::WebtileConfig;
///
/// let config = WebtileConfig::new("0.32")
///     .unwrap()
///     .with_read_timeout(Duration::ZERO)
///     .with_send_interval(Duration::from_millis(100));
/// assert_eq!(config.version.to_string(), "0.32");
/// assert_eq!(config.read_timeout, Some(Duration::ZERO));
/// ```
#[derive(Debug, Clone)]
pub struct WebtileConfig {
    /// Server release the session talks to.
    pub version: ProtocolVersion,
    /// How long a drain loop waits for the next message before failing with
    /// [`WebtileError::Timeout`].
    ///
    /// `Some(Duration::ZERO)` only drains what is already buffered; `None`
    /// waits until a message arrives or the connection closes.
    /// Defaults to **30 seconds**.
    pub read_timeout: Option<Duration>,
    /// Minimum delay between two outgoing frames. Defaults to zero.
    pub send_interval: Duration,
    /// Time [`WebtileClient::disconnect`] gives the transport loop to close
    /// the connection before aborting it. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl WebtileConfig {
    /// Create a configuration for the given version tag (e.g. `"0.32"`).
    ///
    /// # Errors
    ///
    /// [`ConnectionError::InvalidVersion`](crate::ConnectionError::InvalidVersion)
    /// if the tag does not parse.
    pub fn new(version: &str) -> Result<Self> {
        Ok(Self::for_version(version.parse()?))
    }

    /// Create a configuration for an already parsed version.
    pub fn for_version(version: ProtocolVersion) -> Self {
        Self {
            version,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            send_interval: Duration::ZERO,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the wait budget of drain loops.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Let drain loops wait until a message arrives or the connection closes.
    #[must_use]
    pub fn wait_indefinitely(mut self) -> Self {
        self.read_timeout = None;
        self
    }

    /// Set the minimum delay between outgoing frames.
    #[must_use]
    pub fn with_send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval;
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Target ──────────────────────────────────────────────────────────

/// What a [`WebtileClient::read_until`] call waits for.
///
/// A bare `&str` or [`MessageKind`] converts into a target matching on the
/// discriminator alone.
///
/// ```
/// use webtile_client::Target;
///
/// // The game is ready for a free keystroke.
/// let ready = Target::new("input_mode").with_value("mode", 1);
/// // Any `map` push carrying the player's level.
/// let on_level = Target::new("map").with_field("player_on_level");
/// # let _ = (ready, on_level);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    msg: String,
    field: Option<String>,
    value: Option<Value>,
}

impl Target {
    /// Match messages whose `msg` discriminator equals `msg`.
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            field: None,
            value: None,
        }
    }

    /// Additionally require `field` to be present.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Additionally require `field` to equal `value`.
    #[must_use]
    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field = Some(field.into());
        self.value = Some(value.into());
        self
    }

    /// Whether `message` satisfies this target.
    pub fn matches(&self, message: &InboundMessage) -> bool {
        if message.msg() != self.msg {
            return false;
        }
        match (&self.field, &self.value) {
            (None, _) => true,
            (Some(field), None) => message.get(field).is_some(),
            (Some(field), Some(value)) => message.get(field) == Some(value),
        }
    }
}

impl From<&str> for Target {
    fn from(msg: &str) -> Self {
        Self::new(msg)
    }
}

impl From<MessageKind> for Target {
    fn from(kind: MessageKind) -> Self {
        Self::new(kind.as_str())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.msg)?;
        match (&self.field, &self.value) {
            (Some(field), Some(value)) => write!(f, "[{field}={value}]"),
            (Some(field), None) => write!(f, "[{field}]"),
            _ => Ok(()),
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// One Webtile session: a connection plus the login state riding on it.
///
/// Operations take `&mut self`, so a session has at most one request in
/// flight. Independent sessions share nothing and may run concurrently.
pub struct WebtileClient {
    /// Serialized frames for the transport loop.
    cmd_tx: mpsc::UnboundedSender<String>,
    /// Decoded inbound messages, in arrival order.
    inbound_rx: mpsc::UnboundedReceiver<Result<InboundMessage>>,
    /// Messages already looked at by a drain loop, not yet polled.
    backlog: VecDeque<InboundMessage>,
    /// Cleared by the transport loop when it exits.
    connected: Arc<AtomicBool>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    config: WebtileConfig,
    pub(crate) username: Option<String>,
    pub(crate) game_ids: Vec<GameId>,
}

impl WebtileClient {
    /// Start a session over a connected transport.
    ///
    /// Spawns the transport loop on the current tokio runtime.
    pub fn start(transport: impl Transport, config: WebtileConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let connected = Arc::new(AtomicBool::new(true));

        info!(version = %config.version, "starting Webtile session");

        let span = info_span!("webtile_session", version = %config.version);
        let task = tokio::spawn(
            transport_loop(
                transport,
                cmd_rx,
                inbound_tx,
                shutdown_rx,
                Arc::clone(&connected),
                config.send_interval,
            )
            .instrument(span),
        );

        Self {
            cmd_tx,
            inbound_rx,
            backlog: VecDeque::new(),
            connected,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            config,
            username: None,
            game_ids: Vec::new(),
        }
    }

    /// Connect to a Webtile server over WebSocket and start a session.
    ///
    /// # Errors
    ///
    /// [`WebtileError::Connection`] distinguishing a malformed address from
    /// an unreachable endpoint.
    #[cfg(feature = "transport-websocket")]
    pub async fn connect(url: &str, config: WebtileConfig) -> Result<Self> {
        let transport = crate::transports::WebSocketTransport::connect(url).await?;
        Ok(Self::start(transport, config))
    }

    /// Consume the greeting the server sends on connect (`ping`,
    /// `lobby_clear`, `lobby_complete`). The greeting is not kept for
    /// [`poll_message`](Self::poll_message).
    pub async fn await_ready(&mut self) -> Result<()> {
        let unread = self.backlog.len();
        self.read_until(MessageKind::LobbyComplete).await?;
        let greeting = self.backlog.split_off(unread);
        debug!(messages = greeting.len(), "server greeting consumed");
        Ok(())
    }

    // ── Message queue ───────────────────────────────────────────────

    /// Next unprocessed message, without waiting.
    ///
    /// Returns messages already seen by a drain loop first, then anything
    /// buffered since. `None` if nothing has arrived.
    pub fn poll_message(&mut self) -> Option<InboundMessage> {
        if let Some(message) = self.backlog.pop_front() {
            return Some(message);
        }
        loop {
            match self.inbound_rx.try_recv() {
                Ok(Ok(message)) => return Some(message),
                Ok(Err(e)) => warn!("dropping undecodable message: {e}"),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return None,
            }
        }
    }

    /// Discard the messages drain loops already looked at. Messages that
    /// arrived since stay queued. Returns how many were dropped.
    pub fn clear_backlog(&mut self) -> usize {
        let dropped = self.backlog.len();
        self.backlog.clear();
        debug!(dropped, "backlog cleared");
        dropped
    }

    /// Next unprocessed message, waiting up to the configured budget.
    ///
    /// # Errors
    ///
    /// [`WebtileError::Timeout`] if nothing arrives in time,
    /// [`WebtileError::TransportClosed`] if the connection is gone.
    pub async fn next_message(&mut self) -> Result<InboundMessage> {
        if let Some(message) = self.backlog.pop_front() {
            return Ok(message);
        }
        let deadline = self.deadline();
        self.recv_inbound(deadline).await
    }

    /// Drain messages until one matches `target`, and return it.
    ///
    /// A match is returned even if the message would also classify as
    /// blocking. Otherwise a blocking message aborts the drain with
    /// [`WebtileError::Blocking`]. Every drained message stays available to
    /// [`poll_message`](Self::poll_message) until it is polled or dropped
    /// with [`clear_backlog`](Self::clear_backlog); a caller that never polls
    /// should clear the backlog now and then.
    ///
    /// # Errors
    ///
    /// - [`WebtileError::Blocking`] when the server waits for unplanned input
    /// - [`WebtileError::Timeout`] when nothing matched within the budget
    /// - [`WebtileError::TransportClosed`] when the connection closed
    /// - [`WebtileError::Protocol`] for malformed messages
    pub async fn read_until(&mut self, target: impl Into<Target>) -> Result<InboundMessage> {
        let target = target.into();
        self.read_matching(&target.to_string(), |message| target.matches(message))
            .await
    }

    /// [`read_until`](Self::read_until) with an arbitrary predicate.
    pub(crate) async fn read_matching(
        &mut self,
        description: &str,
        predicate: impl Fn(&InboundMessage) -> bool,
    ) -> Result<InboundMessage> {
        let deadline = self.deadline();
        loop {
            let message = self.recv_inbound(deadline).await?;
            self.backlog.push_back(message.clone());

            if predicate(&message) {
                debug!(wanted = description, "drain reached target");
                return Ok(message);
            }
            if let Some(condition) = classify(&message)? {
                debug!(wanted = description, ?condition, "drain interrupted");
                return Err(WebtileError::Blocking(condition));
            }
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.config.read_timeout.map(|budget| Instant::now() + budget)
    }

    async fn recv_inbound(&mut self, deadline: Option<Instant>) -> Result<InboundMessage> {
        let item = match self.inbound_rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Disconnected) => None,
            Err(TryRecvError::Empty) => match deadline {
                None => self.inbound_rx.recv().await,
                Some(deadline) => tokio::time::timeout_at(deadline, self.inbound_rx.recv())
                    .await
                    .map_err(|_| WebtileError::Timeout)?,
            },
        };
        item.unwrap_or(Err(WebtileError::TransportClosed))
    }

    // ── Output ──────────────────────────────────────────────────────

    /// Send a key by name (`key_esc`, `key_dir_n`, `key_ctrl_s`, ...) or a
    /// literal text input. See [`key_message`](crate::keys::key_message).
    pub fn write_key(&mut self, key: &str) -> Result<()> {
        debug!(key, "sending key");
        self.send(&key_message(key))
    }

    /// Send an arbitrary JSON request.
    pub fn write_json(&mut self, value: &Value) -> Result<()> {
        self.send_frame(value.to_string())
    }

    pub(crate) fn send(&self, msg: &ClientMessage) -> Result<()> {
        self.send_frame(serde_json::to_string(msg)?)
    }

    fn send_frame(&self, frame: String) -> Result<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(WebtileError::NotConnected);
        }
        self.cmd_tx
            .send(frame)
            .map_err(|_| WebtileError::NotConnected)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Close the connection and stop the transport loop. Idempotent.
    ///
    /// Buffered messages remain available to
    /// [`poll_message`](Self::poll_message).
    pub async fn disconnect(&mut self) -> Result<()> {
        debug!("disconnect requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("transport loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("transport loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("transport loop aborted: {join_err}");
                    }
                }
            }
        }

        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` while the transport loop is running.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Server version this session was configured for.
    pub fn version(&self) -> ProtocolVersion {
        self.config.version
    }

    /// The session configuration.
    pub fn config(&self) -> &WebtileConfig {
        &self.config
    }

    /// The logged-in username, if any.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Playable games reported at the last login, in server order.
    pub fn game_ids(&self) -> &[GameId] {
        &self.game_ids
    }

    /// Messages a drain loop already looked at.
    pub(crate) fn backlog(&self) -> impl DoubleEndedIterator<Item = &InboundMessage> {
        self.backlog.iter()
    }
}

impl fmt::Debug for WebtileClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebtileClient")
            .field("version", &self.config.version)
            .field("connected", &self.is_connected())
            .field("username", &self.username)
            .field("backlog", &self.backlog.len())
            .finish()
    }
}

impl Drop for WebtileClient {
    fn drop(&mut self) {
        // No executor to drive a graceful close from `Drop`; aborting drops
        // the transport with the loop.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Transport loop ──────────────────────────────────────────────────

/// Background loop multiplexing outgoing frames, shutdown and inbound frames.
///
/// Exits when the handle is dropped or disconnects, when the server closes
/// the connection, or on a transport error. Exiting drops `inbound_tx`, which
/// wakes any drain loop with [`WebtileError::TransportClosed`] once the
/// buffered messages are consumed.
async fn transport_loop(
    mut transport: impl Transport,
    mut cmd_rx: mpsc::UnboundedReceiver<String>,
    inbound_tx: mpsc::UnboundedSender<Result<InboundMessage>>,
    mut shutdown_rx: oneshot::Receiver<()>,
    connected: Arc<AtomicBool>,
    send_interval: Duration,
) {
    debug!("transport loop started");
    let mut last_send: Option<Instant> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(frame) = cmd else {
                    debug!("command channel closed, shutting down transport loop");
                    let _ = transport.close().await;
                    break;
                };
                if let Some(last) = last_send {
                    tokio::time::sleep_until(last + send_interval).await;
                }
                debug!(frame = %frame, "sending");
                if let Err(e) = transport.send(frame).await {
                    error!("transport send error: {e}");
                    break;
                }
                last_send = Some(Instant::now());
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                break;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        if !forward_frame(&mut transport, &inbound_tx, &text).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        let _ = inbound_tx.send(Err(e));
                        break;
                    }
                    None => {
                        info!("connection closed by server");
                        break;
                    }
                }
            }
        }
    }

    connected.store(false, Ordering::Release);
    debug!("transport loop exited");
}

/// Decode one frame onto the inbound queue, answering pings on the way.
/// Returns `false` if the loop should stop.
async fn forward_frame(
    transport: &mut impl Transport,
    inbound_tx: &mpsc::UnboundedSender<Result<InboundMessage>>,
    text: &str,
) -> bool {
    for item in decode_frame(text) {
        match &item {
            Ok(message) if message.kind() == &MessageKind::Ping => {
                let pong = match serde_json::to_string(&ClientMessage::Pong) {
                    Ok(pong) => pong,
                    Err(e) => {
                        error!("failed to serialize pong: {e}");
                        continue;
                    }
                };
                if let Err(e) = transport.send(pong).await {
                    error!("transport send error: {e}");
                    return false;
                }
            }
            Ok(_) => {}
            Err(e) => warn!("undecodable message: {e}; frame: {text}"),
        }
        if inbound_tx.send(item).is_err() {
            debug!("inbound queue closed, receiver dropped");
            return false;
        }
    }
    true
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::blocking::BlockingCondition;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// Replays scripted frames, records sent ones, then hangs.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, WebtileError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
    }

    impl MockTransport {
        fn new(frames: Vec<Value>) -> (Self, Arc<StdMutex<Vec<String>>>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let transport = Self {
                incoming: frames.into_iter().map(|f| Some(Ok(f.to_string()))).collect(),
                sent: Arc::clone(&sent),
            };
            (transport, sent)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), WebtileError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, WebtileError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> std::result::Result<(), WebtileError> {
            Ok(())
        }
    }

    fn config() -> WebtileConfig {
        WebtileConfig::new("0.32")
            .unwrap()
            .with_read_timeout(Duration::from_secs(1))
    }

    fn client(frames: Vec<Value>) -> (WebtileClient, Arc<StdMutex<Vec<String>>>) {
        let (transport, sent) = MockTransport::new(frames);
        (WebtileClient::start(transport, config()), sent)
    }

    // ── Config ──────────────────────────────────────────────────────

    #[test]
    fn config_defaults() {
        let config = WebtileConfig::new("0.29").unwrap();
        assert_eq!(
            config.version,
            ProtocolVersion::Release {
                major: 0,
                minor: 29
            }
        );
        assert_eq!(config.read_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.send_interval, Duration::ZERO);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.wait_indefinitely().read_timeout, None);
    }

    #[test]
    fn config_rejects_bad_version() {
        assert!(matches!(
            WebtileConfig::new("latest"),
            Err(WebtileError::Connection(_))
        ));
    }

    // ── Target ──────────────────────────────────────────────────────

    #[test]
    fn target_matching() {
        let m = InboundMessage::from_value(json!({"msg": "input_mode", "mode": 1})).unwrap();
        assert!(Target::new("input_mode").matches(&m));
        assert!(Target::new("input_mode").with_field("mode").matches(&m));
        assert!(Target::new("input_mode").with_value("mode", 1).matches(&m));
        assert!(!Target::new("input_mode").with_value("mode", 5).matches(&m));
        assert!(!Target::new("input_mode").with_field("tag").matches(&m));
        assert!(!Target::new("menu").matches(&m));
        assert!(!Target::new("").matches(&m));
        assert_eq!(
            Target::new("input_mode").with_value("mode", 1).to_string(),
            "input_mode[mode=1]"
        );
    }

    // ── Queue and drain ─────────────────────────────────────────────

    #[tokio::test]
    async fn read_until_keeps_drained_messages_for_polling() {
        let (mut client, _sent) = client(vec![
            json!({"msg": "lobby_clear"}),
            json!({"msg": "player", "hp": 10}),
            json!({"msg": "map", "cells": []}),
        ]);

        let map = client.read_until("map").await.unwrap();
        assert_eq!(map.kind(), &MessageKind::Map);

        let polled: Vec<String> = std::iter::from_fn(|| client.poll_message())
            .map(|m| m.msg().to_owned())
            .collect();
        assert_eq!(polled, ["lobby_clear", "player", "map"]);
    }

    #[tokio::test]
    async fn clear_backlog_keeps_unread_messages() {
        let (mut client, _sent) = client(vec![
            json!({"msg": "player", "hp": 10}),
            json!({"msg": "map", "cells": []}),
            json!({"msg": "input_mode", "mode": 1}),
        ]);

        client.read_until("map").await.unwrap();
        assert_eq!(client.clear_backlog(), 2);
        assert_eq!(client.clear_backlog(), 0);

        let next = client.next_message().await.unwrap();
        assert_eq!(next.kind(), &MessageKind::InputMode);
    }

    #[tokio::test]
    async fn read_until_stops_on_blocking_message() {
        let (mut client, _sent) = client(vec![
            json!({"msg": "msgs", "messages": [{"text": "You see here 2 items."}]}),
            json!({"msg": "menu", "tag": "pickup"}),
            json!({"msg": "input_mode", "mode": 1}),
        ]);

        let err = client
            .read_until(Target::new("input_mode").with_value("mode", 1))
            .await
            .unwrap_err();
        assert_eq!(err.blocking(), Some(BlockingCondition::Pickup));

        // The target is still queued behind the menu.
        let ready = client
            .read_until(Target::new("input_mode").with_value("mode", 1))
            .await
            .unwrap();
        assert_eq!(ready.get("mode"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn match_takes_precedence_over_blocking() {
        let (mut client, _sent) = client(vec![json!({"msg": "menu", "tag": "pickup"})]);
        let menu = client.read_until("menu").await.unwrap();
        assert_eq!(menu.str_field("tag"), Some("pickup"));
    }

    #[tokio::test]
    async fn zero_budget_never_waits() {
        let (transport, _sent) = MockTransport::new(vec![]);
        let mut client =
            WebtileClient::start(transport, config().with_read_timeout(Duration::ZERO));

        assert!(client.poll_message().is_none());
        let err = client.read_until("map").await.unwrap_err();
        assert!(matches!(err, WebtileError::Timeout));
    }

    #[tokio::test]
    async fn batched_frames_are_split_in_order() {
        let (mut client, _sent) = client(vec![json!({"msgs": [
            {"msg": "lobby_clear"},
            {"msg": "lobby_complete"}
        ]})]);

        assert_eq!(client.next_message().await.unwrap().msg(), "lobby_clear");
        assert_eq!(client.next_message().await.unwrap().msg(), "lobby_complete");
    }

    #[tokio::test]
    async fn bad_batch_entry_does_not_drop_the_rest() {
        let (mut client, _sent) = client(vec![json!({"msgs": [
            {"msg": "login_success", "username": "Username"},
            {"msg": 3},
            {"msg": "go_lobby"}
        ]})]);

        let login = client.read_until("login_success").await.unwrap();
        assert_eq!(login.str_field("username"), Some("Username"));
        let err = client.read_until("go_lobby").await.unwrap_err();
        assert!(matches!(err, WebtileError::Protocol(_)), "{err:?}");
        let lobby = client.read_until("go_lobby").await.unwrap();
        assert_eq!(lobby.kind(), &MessageKind::GoLobby);
    }

    #[tokio::test]
    async fn ping_is_answered_and_still_delivered() {
        let (mut client, sent) = client(vec![json!({"msg": "ping"})]);

        assert_eq!(client.next_message().await.unwrap().kind(), &MessageKind::Ping);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let sent = sent.lock().unwrap();
        assert_eq!(sent.as_slice(), [r#"{"msg":"pong"}"#]);
    }

    #[tokio::test]
    async fn await_ready_consumes_greeting() {
        let (mut client, _sent) = client(vec![
            json!({"msg": "ping"}),
            json!({"msg": "lobby_clear"}),
            json!({"msg": "lobby_complete"}),
        ]);

        client.await_ready().await.unwrap();
        assert!(client.poll_message().is_none());
    }

    #[tokio::test]
    async fn malformed_frame_is_protocol_error() {
        let (mut client, _sent) = client(vec![json!({"no_msg": true})]);
        let err = client.read_until("map").await.unwrap_err();
        assert!(matches!(err, WebtileError::Protocol(_)), "{err:?}");
    }

    #[tokio::test]
    async fn send_interval_spaces_frames() {
        let (transport, sent) = MockTransport::new(vec![]);
        let mut client = WebtileClient::start(
            transport,
            config().with_send_interval(Duration::from_millis(50)),
        );

        let started = Instant::now();
        client.write_key("a").unwrap();
        client.write_key("b").unwrap();
        client.write_key("c").unwrap();
        while sent.lock().unwrap().len() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_blocks_sends() {
        let (mut client, _sent) = client(vec![]);
        client.disconnect().await.unwrap();
        client.disconnect().await.unwrap();

        assert!(!client.is_connected());
        assert!(matches!(
            client.write_key("a"),
            Err(WebtileError::NotConnected)
        ));
        assert!(matches!(
            client.read_until("map").await,
            Err(WebtileError::TransportClosed)
        ));
    }
}
