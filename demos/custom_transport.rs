//! # Custom Transport Example
//!
//! Shows how to implement the [`Transport`] trait with a simple in-process
//! loopback channel, and drives a scripted login through it. Useful for
//! testing bot logic without a game server, or for adapting another I/O
//! layer.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example custom_transport
//! ```

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use webtile_client::{Transport, WebtileClient, WebtileConfig, WebtileError};

// ─────────────────────────────────────────────────────────────────────
// Step 1: Define a channel-based "loopback" transport
// ─────────────────────────────────────────────────────────────────────

/// The client half; handed to `WebtileClient::start`.
pub struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

/// The "server side" of the loopback.
pub struct LoopbackServer {
    /// Frames the client sent.
    pub rx: mpsc::UnboundedReceiver<String>,
    /// Frames for the client.
    pub tx: mpsc::UnboundedSender<String>,
}

fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    (
        LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        },
        LoopbackServer {
            rx: server_rx,
            tx: server_tx,
        },
    )
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: Implement the Transport trait
// ─────────────────────────────────────────────────────────────────────

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), WebtileError> {
        self.tx
            .send(message)
            .map_err(|e| WebtileError::TransportSend(e.to_string()))
    }

    /// Cancel-safe because `mpsc::UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> Option<Result<String, WebtileError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), WebtileError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: A tiny scripted server
// ─────────────────────────────────────────────────────────────────────

async fn run_server(mut server: LoopbackServer) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    server.tx.send(json!({"msg": "ping"}).to_string())?;
    server
        .tx
        .send(json!({"msgs": [{"msg": "lobby_clear"}, {"msg": "lobby_complete"}]}).to_string())?;

    while let Some(frame) = server.rx.recv().await {
        tracing::info!("Server received: {frame}");
        let request: Value = serde_json::from_str(&frame)?;
        let replies = match request["msg"].as_str() {
            Some("login") => vec![
                json!({"msg": "login_success", "username": request["username"]}),
                json!({"msg": "set_game_links", "content":
                    r##"<a href="#play-dcss-web-trunk">Play</a><a href="#play-tut-web-trunk">Tutorial</a>"##}),
            ],
            Some("go_lobby") => vec![json!({"msg": "go_lobby"})],
            _ => vec![],
        };
        for reply in replies {
            server.tx.send(reply.to_string())?;
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────
// Step 4: Wire together the client and the fake server
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (transport, server) = loopback_pair();
    let server_task = tokio::spawn(run_server(server));

    let config = WebtileConfig::new("0.32")?;
    let mut client = WebtileClient::start(transport, config);
    client.await_ready().await?;

    let games = client.login_with_credentials("Username", "Password").await?;
    tracing::info!(?games, "logged in as {:?}", client.username());

    while let Some(message) = client.poll_message() {
        tracing::info!("Client received: {message}");
    }

    client.disconnect().await?;
    if let Ok(Err(e)) = server_task.await {
        tracing::warn!("server script failed: {e}");
    }
    tracing::info!("Done. Custom transport works!");
    Ok(())
}
