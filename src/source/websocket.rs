//! WebSocket transport for the telemetry feed.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{Connector, Frame, FrameStream};
use crate::error::FeedError;

/// Connects to a `ws://` or `wss://` feed endpoint.
///
/// # Example
///
/// ```
/// use fleetwatch::source::{Connector, WebSocketConnector};
///
/// let connector = WebSocketConnector::new("ws://127.0.0.1:8765/ws");
/// assert_eq!(connector.description(), "ws://127.0.0.1:8765/ws");
/// ```
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<FrameStream, FeedError> {
        let (ws_stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        let frames = ws_stream.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
                Ok(Message::Binary(bytes)) => Some(Ok(Frame::Binary(bytes))),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "Feed sent close frame");
                    None
                }
                // Ping / Pong are answered by tungstenite.
                Ok(_) => None,
                Err(e) => Some(Err(FeedError::from(e))),
            }
        });

        Ok(Box::pin(frames))
    }

    fn description(&self) -> &str {
        &self.url
    }
}
