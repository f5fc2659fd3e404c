//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries game packets over one WebSocket connection;
//! [`WebSocketConnector`] opens such connections against the lobby server's
//! `/game` endpoint, which identifies the player by query parameters. Both
//! `ws://` and `wss://` are supported; TLS is handled by
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! # Feature gate
//!
//! This module is only available when the `transport-websocket` feature is enabled
//! (it is enabled by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), secret_hitler_client::ClientError> {
//! use secret_hitler_client::protocol::LobbyCode;
//! use secret_hitler_client::transport::{Connector, Transport};
//! use secret_hitler_client::WebSocketConnector;
//!
//! let connector = WebSocketConnector::new("https://secret-hitler.example.com")?;
//! let lobby = LobbyCode::parse("ABCD")?;
//! let mut transport = connector.connect("ann", &lobby).await?;
//!
//! if let Some(Ok(packet)) = transport.recv().await {
//!     println!("received: {packet}");
//! }
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;

use crate::error::ClientError;
use crate::protocol::LobbyCode;
use crate::transport::{Connector, Transport};

/// Default time allowed for the WebSocket handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Path of the game endpoint, relative to the server base URL.
const GAME_PATH: &str = "game";

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn io_error(kind: std::io::ErrorKind, err: impl std::fmt::Display) -> ClientError {
    ClientError::Io(std::io::Error::new(kind, err.to_string()))
}

// ── Transport ───────────────────────────────────────────────────────

/// A [`Transport`] backed by a WebSocket connection.
///
/// Text frames are game packets. Binary frames are skipped, control frames
/// are answered by tungstenite, and a close frame ends the stream.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: dropping its future before it
/// completes does not consume a message.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Establish a new WebSocket connection to the given URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the URL is invalid or the connection
    /// cannot be established. The [`ErrorKind`](std::io::ErrorKind) of an
    /// underlying I/O failure is preserved.
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        tracing::debug!(url = %url, "connecting to game server");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            io_error(kind, e)
        })?;

        tracing::info!(url = %url, "game connection established");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established WebSocket stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// Like [`connect`](Self::connect), bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Timeout`] if the handshake does not finish in
    /// time, or any error [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, ClientError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| ClientError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| ClientError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ClientError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(ClientError::TransportReceive(e.to_string()))),
            };

            match frame {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(close) => {
                    tracing::debug!(?close, "server sent close frame");
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) => {
                    tracing::trace!("control frame");
                }
                Message::Binary(bytes) => {
                    tracing::warn!(len = bytes.len(), "skipping binary frame");
                }
                Message::Frame(_) => {
                    // Never produced when reading.
                    tracing::trace!("raw frame");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| ClientError::TransportSend(e.to_string()))
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// Opens [`WebSocketTransport`]s to `{base}/game?name=…&lobby=…`.
///
/// The base may be given with an `http(s)` scheme, the same address the
/// lobby HTTP endpoints use; it is rewritten to `ws(s)`.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    base: Url,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// Create a connector for the server at `base`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] with kind `InvalidInput` if `base` is not
    /// an absolute `ws`, `wss`, `http` or `https` URL.
    pub fn new(base: &str) -> Result<Self, ClientError> {
        let invalid = |e: &dyn std::fmt::Display| io_error(std::io::ErrorKind::InvalidInput, e);

        let mut url = Url::parse(base).map_err(|e| invalid(&e))?;
        let scheme = match url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => return Err(invalid(&format!("unsupported scheme {other:?}"))),
        };
        url.set_scheme(scheme)
            .map_err(|()| invalid(&"cannot rewrite scheme"))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);

        Ok(Self {
            base: url,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    /// Set the handshake timeout. Defaults to **10 seconds**.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The game endpoint URL for `name` in `lobby`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the endpoint cannot be joined onto the base.
    pub fn game_url(&self, name: &str, lobby: &LobbyCode) -> Result<Url, ClientError> {
        let mut url = self
            .base
            .join(GAME_PATH)
            .map_err(|e| io_error(std::io::ErrorKind::InvalidInput, e))?;
        url.query_pairs_mut()
            .append_pair("name", name)
            .append_pair("lobby", lobby.as_str());
        Ok(url)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self, name: &str, lobby: &LobbyCode) -> Result<WebSocketTransport, ClientError> {
        let url = self.game_url(name, lobby)?;
        WebSocketTransport::connect_with_timeout(url.as_str(), self.connect_timeout).await
    }
}

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
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
    use tokio::net::TcpListener;

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[test]
    fn game_url_encodes_name_and_lobby() {
        let connector = WebSocketConnector::new("https://sh.example.com").unwrap();
        let lobby = LobbyCode::parse("abcd").unwrap();
        let url = connector.game_url("Ann Lee", &lobby).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://sh.example.com/game?name=Ann+Lee&lobby=ABCD"
        );
    }

    #[test]
    fn game_url_keeps_base_path() {
        let connector = WebSocketConnector::new("ws://localhost:4040/api").unwrap();
        let lobby = LobbyCode::parse("WXYZ").unwrap();
        let url = connector.game_url("bob", &lobby).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:4040/api/game?name=bob&lobby=WXYZ");
    }

    #[test]
    fn connector_rejects_other_schemes() {
        let err = WebSocketConnector::new("ftp://example.com").unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
        assert!(WebSocketConnector::new("not a url").is_err());
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
    }

    /// Accept one WebSocket connection, hand it to `handler`, and return the
    /// server's base URL.
    async fn serve_once<F, Fut>(handler: F) -> String
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
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn connector_reaches_game_endpoint() {
        let base = serve_once(|mut ws| async move {
            ws.send(Message::Text(r#"{"type":"pong"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let connector = WebSocketConnector::new(&base).unwrap();
        let lobby = LobbyCode::parse("ABCD").unwrap();
        let mut transport = connector.connect("ann", &lobby).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), r#"{"type":"pong"}"#);
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn binary_frames_are_skipped() {
        let base = serve_once(|mut ws| async move {
            ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"ok"}"#.into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&base).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), r#"{"type":"ok"}"#);
    }

    #[tokio::test]
    async fn send_after_close_is_rejected() {
        let base = serve_once(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
            .await;

        let mut transport = WebSocketTransport::connect(&base).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        let err = transport.send("{}".to_string()).await.unwrap_err();
        assert!(matches!(err, ClientError::TransportClosed));
    }

    #[tokio::test]
    async fn sent_packets_reach_the_server() {
        let base = serve_once(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&base).await.unwrap();
        transport
            .send(r#"{"command":"ping"}"#.to_string())
            .await
            .unwrap();
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"{"command":"ping"}"#
        );
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // Accepts the TCP connection but never answers the handshake.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(tcp);
        });

        let result = WebSocketTransport::connect_with_timeout(
            &format!("ws://{addr}"),
            Duration::from_millis(50),
        )
        .await;
        assert!(matches!(result.unwrap_err(), ClientError::Timeout));
        server.abort();
    }
}
