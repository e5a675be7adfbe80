//! Transport for the live status channel.
//!
//! [`Connector`] is the seam between the channel's reconnect loop and the
//! actual socket: each call opens a fresh connection and yields its text
//! frames as a stream. [`WsConnector`] is the WebSocket implementation.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Text frames from one open connection. The stream ends, or yields an
/// error, when the connection is gone.
pub type FrameStream = BoxStream<'static, Result<String, LiveError>>;

/// Opens one connection to the push endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<FrameStream, LiveError>;
}

/// WebSocket connector for a `ws://` / `wss://` endpoint.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<FrameStream, LiveError> {
        let (ws_stream, _response) = connect_async(self.url.as_str()).await.map_err(|e| {
            LiveError::Connection(format!("Failed to connect to {}: {e}", self.url))
        })?;

        tracing::info!(url = %self.url, "Live channel connected");

        // Only text frames carry events. Control frames are answered by
        // tungstenite itself; a close frame ends the stream.
        let frames = ws_stream.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "Live channel closed by server");
                    Some(Err(LiveError::Closed))
                }
                Ok(Message::Binary(_)) => {
                    tracing::trace!("Ignoring binary frame");
                    None
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
                Err(e) => Some(Err(LiveError::Protocol(e.to_string()))),
            }
        });

        Ok(frames.boxed())
    }
}

/// Errors from the live channel transport.
#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    /// Failed to establish the connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server closed the connection.
    #[error("Connection closed")]
    Closed,
}
