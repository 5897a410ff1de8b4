//! Streaming feed abstraction.
//!
//! The feed is a single duplex connection carrying one snapshot document per
//! message. This module separates the transport ([`Connector`]) from the
//! connection lifecycle ([`StreamClient`]) so the reconnect state machine can
//! be driven by any source of frames.

mod client;
mod websocket;

pub use client::{StreamClient, StreamHandle, DEFAULT_RECONNECT_DELAY};
pub use websocket::WebSocketConnector;

use std::fmt::{self, Debug};
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::FeedError;

/// One inbound feed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// The frames of one live connection. The stream ends when the peer closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, FeedError>> + Send>>;

/// Opens connections to the telemetry feed.
///
/// Each successful call yields a fresh connection. The stream client never
/// holds more than one at a time.
#[async_trait]
pub trait Connector: Send + Sync + Debug + 'static {
    /// Perform the handshake and return the connection's frames.
    async fn connect(&self) -> Result<FrameStream, FeedError>;

    /// Returns a human-readable description of the endpoint, for logs.
    fn description(&self) -> &str;
}

/// Lifecycle state of the feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}
