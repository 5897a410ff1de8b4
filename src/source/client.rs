//! Feed connection lifecycle.
//!
//! A single background task owns the connection and walks the state machine
//! `Disconnected → Connecting → Connected → Disconnected → …`. Every close,
//! clean or not, and every failed handshake is followed by the same flat
//! reconnect delay. Stopping the handle interrupts whichever step the task
//! is in (handshake, receive, or reconnect wait) and no further attempt is
//! made.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{ConnectionState, Connector, Frame, FrameStream};
use crate::data::Snapshot;
use crate::error::FeedError;
use crate::registry::Registry;

/// Delay between a close and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Counters {
    connect_attempts: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
}

/// How a session ended.
enum SessionEnd {
    Closed,
    Failed(FeedError),
    Stopped,
}

/// Ingests feed frames into a [`Registry`], reconnecting forever.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use fleetwatch::registry::Registry;
/// use fleetwatch::source::{StreamClient, WebSocketConnector};
///
/// # tokio_test::block_on(async {
/// let registry = Arc::new(Registry::new());
/// let handle = StreamClient::new(WebSocketConnector::new("ws://10.0.0.2:8765/ws"), registry)
///     .start();
///
/// // ... later, on shutdown
/// handle.shutdown().await;
/// # });
/// ```
#[derive(Debug)]
pub struct StreamClient {
    connector: Arc<dyn Connector>,
    registry: Arc<Registry>,
    reconnect_delay: Duration,
}

impl StreamClient {
    pub fn new(connector: impl Connector, registry: Arc<Registry>) -> Self {
        Self::from_shared(Arc::new(connector), registry)
    }

    pub fn from_shared(connector: Arc<dyn Connector>, registry: Arc<Registry>) -> Self {
        Self {
            connector,
            registry,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Set the delay between a close and the next attempt.
    ///
    /// Defaults to 5 seconds.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Spawn the connection task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> StreamHandle {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (stop_tx, stop_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let task = tokio::spawn(self.run(state_tx, stop_rx, counters.clone()));

        StreamHandle {
            state_rx,
            stop_tx,
            counters,
            task: Some(task),
        }
    }

    async fn run(
        self,
        state_tx: watch::Sender<ConnectionState>,
        mut stop_rx: watch::Receiver<bool>,
        counters: Arc<Counters>,
    ) {
        let endpoint = self.connector.description().to_string();

        loop {
            state_tx.send_replace(ConnectionState::Connecting);

            // Only counted once the stop check has passed and the handshake starts
            let connected = tokio::select! {
                biased;
                _ = stopped(&mut stop_rx) => break,
                result = async {
                    let attempt = counters.connect_attempts.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::info!(endpoint = %endpoint, attempt, "Connecting to telemetry feed");
                    self.connector.connect().await
                } => result,
            };

            match connected {
                Ok(frames) => {
                    state_tx.send_replace(ConnectionState::Connected);
                    tracing::info!(endpoint = %endpoint, "Telemetry feed connected");

                    let end = self.run_session(frames, &mut stop_rx, &counters).await;
                    state_tx.send_replace(ConnectionState::Disconnected);

                    match end {
                        SessionEnd::Stopped => break,
                        SessionEnd::Closed => {
                            tracing::warn!(endpoint = %endpoint, "Telemetry feed closed");
                        }
                        SessionEnd::Failed(e) => {
                            tracing::warn!(endpoint = %endpoint, error = %e, "Telemetry feed lost");
                        }
                    }
                }
                Err(e) => {
                    state_tx.send_replace(ConnectionState::Disconnected);
                    tracing::error!(endpoint = %endpoint, error = %e, "Telemetry feed connection failed");
                }
            }

            tracing::info!(
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "Reconnecting to telemetry feed after delay"
            );
            tokio::select! {
                biased;
                _ = stopped(&mut stop_rx) => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        state_tx.send_replace(ConnectionState::Disconnected);
        tracing::info!(endpoint = %endpoint, "Stream client stopped");
    }

    /// Drive one connection until it closes, fails, or the client is stopped.
    async fn run_session(
        &self,
        mut frames: FrameStream,
        stop_rx: &mut watch::Receiver<bool>,
        counters: &Counters,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                biased;
                _ = stopped(stop_rx) => return SessionEnd::Stopped,
                next = frames.next() => match next {
                    Some(Ok(frame)) => self.ingest(frame, counters),
                    Some(Err(e)) => return SessionEnd::Failed(e),
                    None => return SessionEnd::Closed,
                },
            }
        }
    }

    /// Parse one frame and apply it. Malformed frames are dropped.
    fn ingest(&self, frame: Frame, counters: &Counters) {
        counters.frames_received.fetch_add(1, Ordering::Relaxed);

        let parsed = match &frame {
            Frame::Text(text) => Snapshot::from_frame(text),
            Frame::Binary(bytes) => Snapshot::from_bytes(bytes),
        };

        match parsed {
            Ok(snapshot) => {
                tracing::trace!(node = %snapshot.node_id, host = %snapshot.hostname, "Snapshot received");
                self.registry.upsert(snapshot);
            }
            Err(e) => {
                counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "Dropping malformed feed frame");
            }
        }
    }
}

/// Resolves once a stop has been requested or the handle is gone.
async fn stopped(stop_rx: &mut watch::Receiver<bool>) {
    loop {
        if *stop_rx.borrow_and_update() {
            return;
        }
        if stop_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Handle to a running [`StreamClient`].
///
/// Exposes the connection state and ingest counters. Dropping the handle
/// stops the client.
#[derive(Debug)]
pub struct StreamHandle {
    state_rx: watch::Receiver<ConnectionState>,
    stop_tx: watch::Sender<bool>,
    counters: Arc<Counters>,
    task: Option<JoinHandle<()>>,
}

impl StreamHandle {
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn connect_attempts(&self) -> u64 {
        self.counters.connect_attempts.load(Ordering::Relaxed)
    }

    pub fn frames_received(&self) -> u64 {
        self.counters.frames_received.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.counters.frames_dropped.load(Ordering::Relaxed)
    }

    /// Request a stop without waiting for the task to exit.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stop the client, close the active connection, and wait for the task.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Stream client task failed");
            }
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}
