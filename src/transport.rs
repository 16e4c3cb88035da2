//! Transport abstraction for the Webtile protocol.
//!
//! The [`Transport`] trait is a bidirectional channel of complete text frames.
//! Connection setup is not part of the trait: construct a connected transport
//! (for example [`WebSocketTransport`](crate::WebSocketTransport)) and hand it
//! to [`WebtileClient::start`](crate::WebtileClient::start).
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use webtile_client::error::WebtileError;
//! use webtile_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), WebtileError> {
//!         // Write one frame
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, WebtileError>> {
//!         // Next frame, or None once the peer closed the connection
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), WebtileError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::WebtileError;

/// A bidirectional text frame transport.
///
/// Each [`send`](Transport::send) writes one frame and each
/// [`recv`](Transport::recv) returns one frame. A frame may hold a single JSON
/// message or a `{"msgs":[...]}` batch; decoding is the client's job.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe: the client polls it
/// inside `tokio::select!`, and a cancelled call must not lose a frame.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a text frame.
    ///
    /// # Errors
    ///
    /// [`WebtileError::TransportClosed`] after [`close`](Transport::close),
    /// [`WebtileError::TransportSend`] if the frame could not be written.
    async fn send(&mut self, message: String) -> Result<(), WebtileError>;

    /// Receive the next text frame.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed
    async fn recv(&mut self) -> Option<Result<String, WebtileError>>;

    /// Close the connection. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), WebtileError>;
}
