//! # Blocking Condition Example
//!
//! Logs in, starts a game, walks north and deals with whatever the game asks
//! on the way:
//!
//! 1. Connect to a Webtile server via WebSocket
//! 2. Log in and start a character
//! 3. Move, dismissing "more" prompts and pickup menus
//! 4. Quit the character and disconnect
//!
//! ## Running
//!
//! ```sh
//! # Start a game server on localhost:8080 with a Username/Password account, then:
//! cargo run --example blocking_condition
//!
//! # Override the server URL or version:
//! WEBTILE_URL=ws://my-server:8080/socket WEBTILE_VERSION=0.31 cargo run --example blocking_condition
//! ```

use webtile_client::{BlockingCondition, Target, WebtileClient, WebtileConfig, WebtileError};

const DEFAULT_URL: &str = "ws://localhost:8080/socket";
const DEFAULT_VERSION: &str = "0.32";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=webtile_client=debug` to see every frame.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("WEBTILE_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let version = std::env::var("WEBTILE_VERSION").unwrap_or_else(|_| DEFAULT_VERSION.to_string());
    let config = WebtileConfig::new(&version)?;

    // ── Connect and log in ──────────────────────────────────────────
    let mut client = WebtileClient::connect(&url, config).await?;
    client.await_ready().await?;

    let games = client.login_with_credentials("Username", "Password").await?;
    let Some(game_id) = games.first().cloned() else {
        return Err("server offers no games".into());
    };
    tracing::info!(%game_id, "starting a minotaur berserker");
    client.start_game(&game_id, "b", "f", "b").await?;

    // ── Walk ────────────────────────────────────────────────────────
    let ready = Target::new("input_mode").with_value("mode", 1);
    for _ in 0..10 {
        client.write_key("key_dir_n")?;
        match client.read_until(ready.clone()).await {
            Ok(_) => {}
            Err(WebtileError::Blocking(BlockingCondition::More)) => {
                client.write_key("key_enter")?;
            }
            Err(WebtileError::Blocking(BlockingCondition::Pickup)) => {
                tracing::info!("several items here, leaving them");
                client.write_key("key_esc")?;
            }
            Err(WebtileError::Blocking(BlockingCondition::Died)) => {
                tracing::info!("the character died");
                break;
            }
            Err(e) => return Err(e.into()),
        }

        while let Some(message) = client.poll_message() {
            if message.msg() == "player" {
                tracing::debug!("player update: {message}");
            }
        }
    }

    // ── Clean up ────────────────────────────────────────────────────
    client.quit_game().await?;
    client.disconnect().await?;
    tracing::info!("Done.");
    Ok(())
}
