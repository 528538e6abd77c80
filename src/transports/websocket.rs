//! WebSocket push channel using `tokio-tungstenite`.
//!
//! Only available with the `transport-websocket` feature (on by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), room_sync_client::SyncError> {
//! use room_sync_client::{Connector, PushTransport, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new("wss://jeux.example");
//! let mut transport = connector.connect("XK42").await?;
//! while let Some(Ok(msg)) = transport.recv().await {
//!     println!("notification: {msg}");
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::SyncError;
use crate::protocol::encode_path_segment;
use crate::transport::{Connector, PushTransport};

/// Underlying WebSocket stream, public for [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Default time allowed for the WebSocket handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A [`PushTransport`] over one WebSocket connection.
///
/// Text frames are notifications; ping/pong are answered by tungstenite and
/// binary frames are skipped. `recv` is cancel-safe.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Connect to `url` (`ws://` or `wss://`).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Connect`] if the URL is invalid or the handshake
    /// fails.
    pub async fn connect(url: &str) -> Result<Self, SyncError> {
        tracing::debug!(url = %url, "connecting push channel");

        let (stream, _response) =
            tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| SyncError::Connect {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;

        tracing::info!(url = %url, "push channel connected");

        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established stream (custom TLS, proxies, headers).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// Same as [`connect`](Self::connect), bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Timeout`] if the deadline elapses.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, SyncError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| SyncError::Timeout)?
    }
}

#[async_trait]
impl PushTransport for WebSocketTransport {
    async fn recv(&mut self) -> Option<Result<String, SyncError>> {
        if self.closed {
            return None;
        }
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Some(Err(SyncError::TransportReceive(e.to_string()))),
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "push channel close frame");
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                Message::Binary(_) => {
                    tracing::warn!("unexpected binary frame on push channel, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), SyncError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| SyncError::TransportReceive(e.to_string()))
    }
}

/// Opens `{ws_base}/ws/salle/{code}` for each (re)connection.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    ws_base: String,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// `ws_base` is the scheme and host, e.g. `wss://jeux.example`.
    pub fn new(ws_base: impl Into<String>) -> Self {
        Self {
            ws_base: ws_base.into().trim_end_matches('/').to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Push URL for `room_code`.
    pub fn url_for(&self, room_code: &str) -> String {
        format!("{}/ws/salle/{}", self.ws_base, encode_path_segment(room_code))
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self, room_code: &str) -> Result<WebSocketTransport, SyncError> {
        WebSocketTransport::connect_with_timeout(&self.url_for(room_code), self.connect_timeout)
            .await
    }
}
