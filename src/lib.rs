//! # Webtile Client
//!
//! Async Rust client for the Webtile JSON-over-WebSocket protocol spoken by
//! browser-playable roguelike game servers. Built for bots and automated
//! tests that drive a game through the same socket a browser would.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement the [`Transport`] trait for any
//!   backend, or use the built-in [`WebSocketTransport`]
//! - **Blocking-aware reads**: [`WebtileClient::read_until`] stops with a
//!   typed [`BlockingCondition`] when the game waits for unplanned input
//! - **Session flows**: login by password or cookie, registration, game
//!   start/continue/save/quit, RC files and scenario games
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use webtile_client::{BlockingCondition, WebtileClient, WebtileConfig, WebtileError};
//!
//! # async fn run() -> Result<(), WebtileError> {
//! let config = WebtileConfig::new("0.32")?;
//! let mut client = WebtileClient::connect("ws://localhost:8080/socket", config).await?;
//! client.await_ready().await?;
//!
//! let games = client.login_with_credentials("Username", "Password").await?;
//! if let Some(game_id) = games.first() {
//!     client.start_game(game_id, "b", "f", "b").await?;
//! }
//!
//! client.write_key("key_dir_n")?;
//! match client.read_until("player").await {
//!     Ok(_) => {}
//!     Err(WebtileError::Blocking(BlockingCondition::More)) => client.write_key("key_esc")?,
//!     Err(e) => return Err(e),
//! }
//!
//! client.quit_game().await?;
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod blocking;
pub mod client;
pub mod error;
pub mod game;
pub mod keys;
pub mod protocol;
pub mod transport;
pub mod transports;

pub use blocking::{classify, BlockingCondition};
pub use client::{Target, WebtileClient, WebtileConfig};
pub use error::{AuthError, ConnectionError, Result, WebtileError};
pub use protocol::{ClientMessage, GameId, InboundMessage, MessageKind, ProtocolVersion};
pub use transport::Transport;

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
