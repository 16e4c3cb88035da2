//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Both `ws://` and `wss://` URLs are supported; TLS is handled by
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! The server compresses most pushes as binary frames cut from one raw
//! deflate stream per connection. [`recv`](Transport::recv) inflates them
//! and hands out the JSON text, so callers only ever see text frames.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), webtile_client::WebtileError> {
//! use webtile_client::{Transport, WebSocketTransport};
//!
//! let mut transport = WebSocketTransport::connect("ws://localhost:8080/socket").await?;
//!
//! if let Some(Ok(frame)) = transport.recv().await {
//!     println!("received: {frame}");
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use flate2::{Decompress, FlushDecompress};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;

use crate::error::{ConnectionError, WebtileError};
use crate::transport::Transport;

/// Sync-flush marker the server strips from every compressed frame.
const DEFLATE_TAIL: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// Smallest output buffer growth step while inflating.
const INFLATE_CHUNK: usize = 16 * 1024;

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a WebSocket connection.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    inflater: Inflater,
    closed: bool,
}

impl WebSocketTransport {
    /// Establish a new WebSocket connection to the given URL.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::InvalidUrl`] if the address cannot be parsed or
    ///   uses an unsupported scheme
    /// - [`ConnectionError::Unreachable`] if the endpoint refuses or cannot be
    ///   reached
    /// - [`ConnectionError::Handshake`] for any other handshake failure
    pub async fn connect(url: &str) -> Result<Self, WebtileError> {
        let endpoint = parse_endpoint(url)?;
        tracing::debug!(url = %endpoint, "connecting to Webtile server");

        let (stream, _response) = tokio_tungstenite::connect_async(endpoint.as_str())
            .await
            .map_err(|e| connection_error(url, e))?;

        tracing::info!(url = %endpoint, "WebSocket connection established");

        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established WebSocket stream (custom TLS, proxies,
    /// extra headers).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            inflater: Inflater::new(),
            closed: false,
        }
    }

    /// Like [`connect`](Self::connect), failing with
    /// [`WebtileError::Timeout`] if the connection is not up within `timeout`.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, WebtileError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| WebtileError::Timeout)?
    }
}

/// Parse a server address. Only `ws` and `wss` URLs with a host are accepted.
fn parse_endpoint(url: &str) -> Result<Url, ConnectionError> {
    let invalid = |reason: String| ConnectionError::InvalidUrl(format!("{url}: {reason}"));
    let endpoint = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(endpoint.scheme(), "ws" | "wss") {
        return Err(invalid(format!("unsupported scheme `{}`", endpoint.scheme())));
    }
    if endpoint.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_owned()));
    }
    Ok(endpoint)
}

fn connection_error(url: &str, error: tungstenite::Error) -> ConnectionError {
    match error {
        tungstenite::Error::Url(e) => ConnectionError::InvalidUrl(format!("{url}: {e}")),
        tungstenite::Error::HttpFormat(e) => ConnectionError::InvalidUrl(format!("{url}: {e}")),
        tungstenite::Error::Io(e) => ConnectionError::Unreachable(e),
        other => ConnectionError::Handshake(other.to_string()),
    }
}

/// Raw deflate decoder shared by every binary frame of one connection.
///
/// Frames back-reference earlier ones, so they must be inflated in arrival
/// order by the same decoder.
#[derive(Debug)]
struct Inflater {
    decompress: Decompress,
}

impl Inflater {
    fn new() -> Self {
        // Raw deflate, 15 bit window.
        Self {
            decompress: Decompress::new(false),
        }
    }

    fn inflate(&mut self, data: &[u8]) -> Result<String, WebtileError> {
        let mut input = Vec::with_capacity(data.len() + DEFLATE_TAIL.len());
        input.extend_from_slice(data);
        input.extend_from_slice(&DEFLATE_TAIL);

        let mut output = Vec::with_capacity(input.len().saturating_mul(4).max(INFLATE_CHUNK));
        let mut offset = 0usize;
        loop {
            let (read_before, written_before) = (self.decompress.total_in(), output.len());
            self.decompress
                .decompress_vec(
                    input.get(offset..).unwrap_or_default(),
                    &mut output,
                    FlushDecompress::Sync,
                )
                .map_err(|e| WebtileError::TransportReceive(format!("corrupt deflate frame: {e}")))?;
            let read = (self.decompress.total_in() - read_before) as usize;
            offset = offset.saturating_add(read);

            let has_room = output.len() < output.capacity();
            if offset >= input.len() && has_room {
                break;
            }
            if read == 0 && output.len() == written_before && has_room {
                return Err(WebtileError::TransportReceive(
                    "deflate frame stalled before its end".to_owned(),
                ));
            }
            output.reserve(output.capacity().max(INFLATE_CHUNK));
        }

        String::from_utf8(output).map_err(|e| {
            WebtileError::TransportReceive(format!("inflated frame is not UTF-8: {e}"))
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), WebtileError> {
        if self.closed {
            return Err(WebtileError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| WebtileError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, WebtileError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(WebtileError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // tungstenite answers pings itself.
                }
                Message::Binary(data) => return Some(self.inflater.inflate(&data)),
                Message::Frame(_) => {
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), WebtileError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| WebtileError::TransportSend(e.to_string()))
    }
}

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
    use serde_json::json;
    use tokio::net::TcpListener;

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn malformed_port_is_invalid_url() {
        let err = WebSocketTransport::connect("ws://localhost:XXXX/socket")
            .await
            .unwrap_err();
        assert!(
            matches!(err, WebtileError::Connection(ConnectionError::InvalidUrl(_))),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn unsupported_scheme_is_invalid_url() {
        let err = WebSocketTransport::connect("http://localhost/socket")
            .await
            .unwrap_err();
        assert!(
            matches!(err, WebtileError::Connection(ConnectionError::InvalidUrl(_))),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn refused_port_is_unreachable() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1/socket")
            .await
            .unwrap_err();
        assert!(
            matches!(err, WebtileError::Connection(ConnectionError::Unreachable(_))),
            "{err:?}"
        );
    }

    #[test]
    fn endpoints_are_validated_before_connecting() {
        for bad in [
            "ws://localhost:XXXX/socket",
            "localhost:8080/socket",
            "not a url",
            "https://localhost/socket",
        ] {
            assert!(
                matches!(parse_endpoint(bad), Err(ConnectionError::InvalidUrl(_))),
                "{bad}"
            );
        }
        for good in ["ws://localhost:8080/socket", "wss://crawl.example.org/socket"] {
            assert_eq!(parse_endpoint(good).unwrap().as_str(), good);
        }
    }

    // ── Deflate ──────────────────────────────────────────────────────────

    /// `{"msgs":[{"msg":"ping"}]}`, first frame of a compressed stream.
    const PING_FRAME: [u8; 26] = [
        170, 86, 202, 45, 78, 47, 86, 178, 138, 174, 6, 49, 148, 172, 20, 148, 10, 50, 243, 210,
        149, 106, 99, 107, 1, 0,
    ];

    /// `{"msgs":[{"msg":"lobby_clear"},{"msg":"lobby_complete"}]}`, only
    /// decodable after [`PING_FRAME`].
    const LOBBY_FRAME: [u8; 30] = [
        170, 198, 144, 201, 201, 79, 74, 170, 140, 79, 206, 73, 77, 44, 82, 170, 213, 65, 23, 206,
        207, 45, 200, 73, 45, 73, 5, 105, 5, 0,
    ];

    fn inflated_json(inflater: &mut Inflater, frame: &[u8]) -> Option<serde_json::Value> {
        let text = inflater.inflate(frame).ok()?;
        serde_json::from_str(&text).ok()
    }

    #[test]
    fn inflater_keeps_window_across_frames() {
        let mut inflater = Inflater::new();
        assert_eq!(
            inflated_json(&mut inflater, &PING_FRAME),
            Some(json!({"msgs": [{"msg": "ping"}]}))
        );
        assert_eq!(
            inflated_json(&mut inflater, &LOBBY_FRAME),
            Some(json!({"msgs": [{"msg": "lobby_clear"}, {"msg": "lobby_complete"}]}))
        );
    }

    #[test]
    fn inflater_needs_earlier_frames() {
        let mut fresh = Inflater::new();
        assert_ne!(
            inflated_json(&mut fresh, &LOBBY_FRAME),
            Some(json!({"msgs": [{"msg": "lobby_clear"}, {"msg": "lobby_complete"}]}))
        );
    }

    // ── Mock-stream helpers ──────────────────────────────────────────────

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and returns the address to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}/socket")
    }

    #[tokio::test]
    async fn recv_receives_text_frames_in_order() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text(r#"{"msg":"ping"}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text(
                r#"{"msgs":[{"msg":"lobby_clear"},{"msg":"lobby_complete"}]}"#.into(),
            ))
            .await
            .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), r#"{"msg":"ping"}"#);
        assert!(transport
            .recv()
            .await
            .unwrap()
            .unwrap()
            .contains("lobby_complete"));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_inflates_binary_frames() {
        let url = start_mock_server(|mut ws| async move {
            for frame in [PING_FRAME.as_slice(), LOBBY_FRAME.as_slice()] {
                ws.send(Message::Binary(frame.to_vec().into())).await.unwrap();
            }
            ws.send(Message::Text(r#"{"msg":"go_lobby"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let mut frames = Vec::new();
        while let Some(frame) = transport.recv().await {
            frames.push(serde_json::from_str::<serde_json::Value>(&frame.unwrap()).unwrap());
        }
        assert_eq!(
            frames,
            [
                json!({"msgs": [{"msg": "ping"}]}),
                json!({"msgs": [{"msg": "lobby_clear"}, {"msg": "lobby_complete"}]}),
                json!({"msg": "go_lobby"}),
            ]
        );
    }

    #[tokio::test]
    async fn send_reaches_server() {
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
        let url = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = seen_tx.send(text.to_string());
            }
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport
            .send(r#"{"msg":"go_lobby"}"#.to_string())
            .await
            .unwrap();
        assert_eq!(seen_rx.await.unwrap(), r#"{"msg":"go_lobby"}"#);
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url = start_mock_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("{}".to_string()).await.unwrap_err();
        assert!(matches!(err, WebtileError::TransportClosed));
    }

    #[tokio::test]
    async fn double_close_is_idempotent() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // Accepts the TCP connection but never answers the handshake.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (_tcp, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let result = WebSocketTransport::connect_with_timeout(
            &format!("ws://{addr}/socket"),
            std::time::Duration::from_millis(50),
        )
        .await;

        assert!(matches!(result.unwrap_err(), WebtileError::Timeout));
    }
}
