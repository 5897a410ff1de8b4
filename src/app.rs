//! Application lifecycle.
//!
//! [`Fleet`] owns the single registry instance together with the background
//! work that feeds and prunes it, and exposes the read and write operations
//! a presentation layer needs.

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::Settings;
use crate::data::{evaluate, HealthStatus, NodeId, Threshold};
use crate::error::StoreError;
use crate::fleet::FleetView;
use crate::registry::{EvictionHandle, Registry, RegistryEntry};
use crate::source::{ConnectionState, Connector, StreamClient, StreamHandle};
use crate::store::{ThresholdBook, ThresholdStore};

pub use crate::fleet::columnize;

/// A running fleet monitor.
#[derive(Debug)]
pub struct Fleet {
    registry: Arc<Registry>,
    thresholds: ThresholdBook,
    store: Box<dyn ThresholdStore>,
    stream: StreamHandle,
    evictor: EvictionHandle,
}

impl Fleet {
    /// Start the eviction sweep and the feed client, then load thresholds.
    ///
    /// Ingestion runs while the store is read. A threshold store that cannot
    /// be read is not fatal: every node is evaluated against the default
    /// limits until a save succeeds.
    pub async fn start(
        settings: &Settings,
        connector: Arc<dyn Connector>,
        store: Box<dyn ThresholdStore>,
    ) -> Self {
        let registry = Arc::new(Registry::new());
        let evictor = registry
            .clone()
            .spawn_evictor(settings.eviction_interval, settings.node_ttl);
        let stream = StreamClient::from_shared(connector, registry.clone())
            .reconnect_delay(settings.reconnect_delay)
            .start();

        let thresholds = ThresholdBook::new();
        thresholds.load(store.as_ref()).await;

        tracing::info!(
            ttl_ms = settings.node_ttl.as_millis() as u64,
            eviction_interval_ms = settings.eviction_interval.as_millis() as u64,
            thresholds = thresholds.len(),
            "Fleet monitor started"
        );

        Self {
            registry,
            thresholds,
            store,
            stream,
            evictor,
        }
    }

    pub fn connected(&self) -> bool {
        self.stream.connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.stream.connection_state()
    }

    /// Subscribe to connection state changes.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.stream.watch_state()
    }

    pub fn node_count(&self) -> usize {
        self.registry.len()
    }

    /// Point-in-time copy of every registry entry.
    pub fn snapshot(&self) -> Vec<RegistryEntry> {
        self.registry.snapshot()
    }

    /// Health of one entry against its node's threshold.
    pub fn evaluate(&self, entry: &RegistryEntry) -> HealthStatus {
        let threshold = self.thresholds.get(entry.node_id().as_str());
        evaluate(&entry.snapshot, &threshold)
    }

    /// Filtered, sorted and health-annotated rows of the current registry.
    pub fn view(&self, query: &str) -> FleetView {
        FleetView::build(self.registry.snapshot(), &self.thresholds, query)
    }

    /// Persist a node's threshold, applying it only once the store accepts it.
    pub async fn save_threshold(
        &self,
        id: impl Into<NodeId>,
        threshold: Threshold,
    ) -> Result<(), StoreError> {
        self.thresholds
            .save(self.store.as_ref(), id.into(), threshold)
            .await
    }

    pub fn thresholds(&self) -> &ThresholdBook {
        &self.thresholds
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The feed client handle, for connection counters.
    pub fn stream(&self) -> &StreamHandle {
        &self.stream
    }

    /// Stop the feed client and the eviction sweep and wait for both.
    ///
    /// Once this returns the registry is no longer mutated.
    pub async fn shutdown(self) {
        let Fleet {
            registry,
            stream,
            evictor,
            ..
        } = self;

        stream.shutdown().await;
        evictor.shutdown().await;
        tracing::info!(nodes = registry.len(), "Fleet monitor stopped");
    }
}
