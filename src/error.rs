//! Error types for the feed, frame decoding, and threshold storage.

use thiserror::Error;

/// Errors raised by the streaming feed transport.
///
/// None of these are fatal to the stream client: every variant ends the
/// current session and schedules the fixed-delay reconnect.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The handshake with the feed endpoint failed.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The connection broke while receiving.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::Transport(err.to_string())
    }
}

/// A frame that could not be decoded into a snapshot.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The payload was not a valid snapshot document.
    #[error("Malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload was not valid UTF-8.
    #[error("Frame is not UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
}

/// Errors returned by threshold store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed or returned a non-success status.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored document could not be parsed.
    #[error("Failed to parse thresholds: {0}")]
    Parse(String),

    /// The store refused the write.
    #[error("Save rejected: {0}")]
    Rejected(String),

    /// Timeout waiting for the store.
    #[error("Request timed out")]
    Timeout,
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout
        } else if err.is_decode() {
            StoreError::Parse(err.to_string())
        } else {
            StoreError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Parse(err.to_string())
    }
}
