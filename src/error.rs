//! Error types for the Webtile client.

use thiserror::Error;

use crate::blocking::BlockingCondition;

/// Errors raised while establishing a connection, before any session exists.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The address could not be parsed as a `ws://` or `wss://` URL.
    #[error("invalid server address: {0}")]
    InvalidUrl(String),

    /// The endpoint refused the connection or could not be reached.
    #[error("server unreachable: {0}")]
    Unreachable(#[source] std::io::Error),

    /// The TCP connection succeeded but the WebSocket handshake did not.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    /// The protocol version tag is not of the form `<major>.<minor>`.
    #[error("invalid protocol version tag: {0:?}")]
    InvalidVersion(String),
}

/// Authentication failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad credentials, or a stale/unknown cookie.
    #[error("Failed to login")]
    LoginFailed,

    /// The server rejected an account registration.
    #[error("Failed to register: {0}")]
    RegistrationFailed(String),

    /// The operation requires a logged-in session.
    #[error("not logged in")]
    NotLoggedIn,
}

/// Errors that can occur when using the Webtile client.
#[derive(Debug, Error)]
pub enum WebtileError {
    /// Connection establishment failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Login or registration failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A drain loop stopped because the server is waiting for input the
    /// caller did not anticipate. Recoverable; see [`BlockingCondition`].
    #[error(transparent)]
    Blocking(#[from] BlockingCondition),

    /// The scenario service rejected a scenario definition. The diagnostic is
    /// the service's text, unmodified.
    #[error("{0}")]
    Scenario(String),

    /// A well-formed frame carried a message of unexpected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// The session has been disconnected.
    #[error("not connected to server")]
    NotConnected,

    /// No matching message arrived within the configured wait budget.
    #[error("operation timed out")]
    Timeout,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WebtileError {
    /// Returns the blocking condition if this error is one.
    pub fn blocking(&self) -> Option<BlockingCondition> {
        match self {
            Self::Blocking(condition) => Some(*condition),
            _ => None,
        }
    }
}

/// A specialized [`Result`] type for Webtile client operations.
pub type Result<T> = std::result::Result<T, WebtileError>;
