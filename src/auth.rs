//! Login, registration and session cookies.

use tracing::{debug, info, warn};

use crate::client::WebtileClient;
use crate::error::{AuthError, Result, WebtileError};
use crate::protocol::{parse_game_links, ClientMessage, GameId, MessageKind};

impl WebtileClient {
    /// Log in with a username and password.
    ///
    /// Returns the playable games, in server order. Logging in again on the
    /// same session replaces the username and game list.
    ///
    /// # Errors
    ///
    /// [`AuthError::LoginFailed`] if the server rejects the credentials.
    pub async fn login_with_credentials(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<Vec<GameId>> {
        self.send(&ClientMessage::Login {
            username: username.to_owned(),
            password: password.to_owned(),
        })?;
        self.await_login(Some(username)).await?;
        self.enter_lobby().await
    }

    /// Log in with a cookie from [`request_cookie`](Self::request_cookie).
    ///
    /// A cookie is single-use: the server invalidates it once a newer one is
    /// minted for the account.
    ///
    /// # Errors
    ///
    /// [`AuthError::LoginFailed`] if the cookie is unknown or stale.
    pub async fn login_with_cookie(&mut self, cookie: &str) -> Result<Vec<GameId>> {
        self.send(&ClientMessage::TokenLogin {
            cookie: cookie.to_owned(),
        })?;
        // The account name is the cookie prefix, but the server is the
        // authority on who logged in.
        self.await_login(None).await?;
        self.enter_lobby().await
    }

    /// Ask the server for a login cookie for the current account.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotLoggedIn`] without an active login
    /// - [`WebtileError::Protocol`] if the cookie is not `<username>%<token>`
    pub async fn request_cookie(&mut self) -> Result<String> {
        let username = self.username.clone().ok_or(AuthError::NotLoggedIn)?;

        self.send(&ClientMessage::SetLoginCookie)?;
        let reply = self.read_until(MessageKind::LoginCookie).await?;

        let cookie = reply
            .str_field("cookie")
            .ok_or_else(|| WebtileError::Protocol(format!("login_cookie without cookie: {reply}")))?;
        if !cookie.starts_with(&format!("{username}%")) {
            return Err(WebtileError::Protocol(format!(
                "cookie does not belong to {username}"
            )));
        }
        debug!(username = %username, "login cookie issued");
        Ok(cookie.to_owned())
    }

    /// Create an account. The server logs the session in as the new user.
    ///
    /// # Errors
    ///
    /// [`AuthError::RegistrationFailed`] with the server's reason.
    pub async fn register_account(
        &mut self,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<Vec<GameId>> {
        self.send(&ClientMessage::Register {
            username: username.to_owned(),
            password: password.to_owned(),
            email: email.map(ToOwned::to_owned),
        })?;
        self.await_login(Some(username)).await?;
        info!(username, "account registered");
        self.enter_lobby().await
    }

    /// Drain to the outcome of a login or registration request and record
    /// the logged-in user.
    async fn await_login(&mut self, expected: Option<&str>) -> Result<()> {
        let outcome = self
            .read_matching("login outcome", |message| match message.kind() {
                MessageKind::LoginFail | MessageKind::RegisterFail => true,
                MessageKind::LoginSuccess => {
                    expected.is_none() || message.str_field("username") == expected
                }
                _ => false,
            })
            .await?;

        match outcome.kind() {
            MessageKind::LoginSuccess => {
                let username = outcome
                    .str_field("username")
                    .or(expected)
                    .ok_or_else(|| {
                        WebtileError::Protocol(format!("login_success without username: {outcome}"))
                    })?
                    .to_owned();
                info!(username = %username, "logged in");
                self.username = Some(username);
                Ok(())
            }
            MessageKind::RegisterFail => {
                let reason = outcome
                    .str_field("reason")
                    .unwrap_or("registration refused")
                    .to_owned();
                warn!(reason = %reason, "registration failed");
                Err(AuthError::RegistrationFailed(reason).into())
            }
            _ => {
                warn!("login refused");
                Err(AuthError::LoginFailed.into())
            }
        }
    }

    /// Return to the lobby and refresh the game list from the latest
    /// `set_game_links` push.
    async fn enter_lobby(&mut self) -> Result<Vec<GameId>> {
        self.send(&ClientMessage::GoLobby)?;
        self.read_until(MessageKind::GoLobby).await?;

        let game_ids = self
            .backlog()
            .rev()
            .find(|message| message.kind() == &MessageKind::SetGameLinks)
            .and_then(|message| message.str_field("content"))
            .map(parse_game_links)
            .ok_or_else(|| WebtileError::Protocol("no set_game_links after login".to_owned()))?;

        self.game_ids = game_ids;
        debug!(games = ?self.game_ids, "game list refreshed");
        Ok(self.game_ids.clone())
    }
}
