//! Per-node threshold storage.
//!
//! The durable store is an external key/value service reached through the
//! [`ThresholdStore`] trait. [`ThresholdBook`] is the in-memory view used at
//! evaluation time: it is filled once at startup and only changes after a
//! save has been acknowledged by the store.

mod file;
mod http;
mod memory;

pub use file::FileThresholdStore;
pub use http::{HttpThresholdStore, HttpThresholdStoreBuilder};
pub use memory::MemoryThresholdStore;

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::data::{NodeId, Threshold};
use crate::error::StoreError;

/// Black-box persistence for per-node thresholds.
#[async_trait]
pub trait ThresholdStore: Send + Sync + Debug {
    /// Fetch every stored threshold.
    async fn fetch_all(&self) -> Result<HashMap<NodeId, Threshold>, StoreError>;

    /// Persist the threshold for one node.
    async fn save(&self, id: &NodeId, threshold: &Threshold) -> Result<(), StoreError>;

    /// Returns a human-readable description of the store, for logs.
    fn description(&self) -> &str;
}

#[async_trait]
impl<T: ThresholdStore + ?Sized> ThresholdStore for Arc<T> {
    async fn fetch_all(&self) -> Result<HashMap<NodeId, Threshold>, StoreError> {
        (**self).fetch_all().await
    }

    async fn save(&self, id: &NodeId, threshold: &Threshold) -> Result<(), StoreError> {
        (**self).save(id, threshold).await
    }

    fn description(&self) -> &str {
        (**self).description()
    }
}

/// In-memory thresholds with read-time defaults.
#[derive(Debug, Default)]
pub struct ThresholdBook {
    thresholds: RwLock<HashMap<NodeId, Threshold>>,
    /// Held across the store call and the local insert so saves apply in order.
    save_lock: Mutex<()>,
}

impl ThresholdBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(thresholds: HashMap<NodeId, Threshold>) -> Self {
        Self {
            thresholds: RwLock::new(thresholds),
            save_lock: Mutex::new(()),
        }
    }

    /// Replace the book with the store's contents.
    ///
    /// A failed fetch is logged and leaves the book empty, so every node
    /// is evaluated against the defaults.
    pub async fn load(&self, store: &dyn ThresholdStore) {
        match store.fetch_all().await {
            Ok(thresholds) => {
                tracing::info!(
                    store = store.description(),
                    count = thresholds.len(),
                    "Loaded node thresholds"
                );
                *self.thresholds.write() = thresholds;
            }
            Err(e) => {
                tracing::warn!(
                    store = store.description(),
                    error = %e,
                    "Failed to load thresholds, using defaults"
                );
                self.thresholds.write().clear();
            }
        }
    }

    /// The node's threshold, or the default when none is stored.
    pub fn get(&self, id: &str) -> Threshold {
        self.thresholds.read().get(id).copied().unwrap_or_default()
    }

    /// Whether a stored (non-default) threshold exists for the node.
    pub fn contains(&self, id: &str) -> bool {
        self.thresholds.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.thresholds.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.read().is_empty()
    }

    /// Persist a threshold, then apply it locally.
    ///
    /// On failure the book is left untouched and the error is returned.
    /// Concurrent saves run one at a time, in call order.
    pub async fn save(
        &self,
        store: &dyn ThresholdStore,
        id: NodeId,
        threshold: Threshold,
    ) -> Result<(), StoreError> {
        let _guard = self.save_lock.lock().await;

        if let Err(e) = store.save(&id, &threshold).await {
            tracing::warn!(node = %id, store = store.description(), error = %e, "Threshold save failed");
            return Err(e);
        }

        tracing::info!(
            node = %id,
            cpu_limit = threshold.cpu_limit,
            disk_limit = threshold.disk_limit,
            load_limit = threshold.load_limit,
            "Threshold saved"
        );
        self.thresholds.write().insert(id, threshold);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom() -> Threshold {
        Threshold {
            cpu_limit: 60.0,
            disk_limit: 70.0,
            load_limit: 2.0,
        }
    }

    #[test]
    fn test_unknown_node_gets_defaults() {
        let book = ThresholdBook::new();
        assert_eq!(book.get("10.0.0.9"), Threshold::default());
        assert!(!book.contains("10.0.0.9"));
    }

    #[tokio::test]
    async fn test_load_from_store() {
        let store = MemoryThresholdStore::new();
        store.insert("10.0.0.1", custom());

        let book = ThresholdBook::new();
        book.load(&store).await;

        assert_eq!(book.len(), 1);
        assert_eq!(book.get("10.0.0.1"), custom());
        assert_eq!(book.get("10.0.0.2"), Threshold::default());
    }

    #[tokio::test]
    async fn test_failed_load_falls_back_to_defaults() {
        let store = MemoryThresholdStore::new();
        store.insert("10.0.0.1", custom());
        store.set_failing(true);

        let book = ThresholdBook::new();
        book.load(&store).await;

        assert!(book.is_empty());
        assert_eq!(book.get("10.0.0.1"), Threshold::default());
    }

    #[tokio::test]
    async fn test_save_applies_after_store_accepts() {
        let store = MemoryThresholdStore::new();
        let book = ThresholdBook::new();

        book.save(&store, NodeId::from("10.0.0.1"), custom()).await.unwrap();

        assert_eq!(book.get("10.0.0.1"), custom());
        assert_eq!(store.get("10.0.0.1"), Some(custom()));
    }

    #[tokio::test]
    async fn test_failed_save_leaves_book_unchanged() {
        let store = MemoryThresholdStore::new();
        let book = ThresholdBook::new();
        book.save(&store, NodeId::from("10.0.0.1"), custom()).await.unwrap();

        store.set_failing(true);
        let tighter = Threshold {
            cpu_limit: 10.0,
            ..custom()
        };
        let result = book.save(&store, NodeId::from("10.0.0.1"), tighter).await;

        assert!(result.is_err());
        assert_eq!(book.get("10.0.0.1"), custom());

        let result = book.save(&store, NodeId::from("10.0.0.2"), tighter).await;
        assert!(result.is_err());
        assert!(!book.contains("10.0.0.2"));
    }

    /// Records each save on arrival, then takes longer for higher CPU limits.
    #[derive(Debug, Default)]
    struct SlowStore {
        saved: RwLock<HashMap<NodeId, Threshold>>,
    }

    #[async_trait]
    impl ThresholdStore for SlowStore {
        async fn fetch_all(&self) -> Result<HashMap<NodeId, Threshold>, StoreError> {
            Ok(self.saved.read().clone())
        }

        async fn save(&self, id: &NodeId, threshold: &Threshold) -> Result<(), StoreError> {
            self.saved.write().insert(id.clone(), *threshold);
            let delay = std::time::Duration::from_millis(threshold.cpu_limit as u64);
            tokio::time::sleep(delay).await;
            Ok(())
        }

        fn description(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_saves_end_in_store_order() {
        let store = SlowStore::default();
        let book = ThresholdBook::new();
        let slow = Threshold {
            cpu_limit: 100.0,
            ..Threshold::default()
        };
        let fast = Threshold {
            cpu_limit: 10.0,
            ..Threshold::default()
        };

        let (first, second) = tokio::join!(
            book.save(&store, NodeId::from("10.0.0.1"), slow),
            book.save(&store, NodeId::from("10.0.0.1"), fast),
        );
        first.unwrap();
        second.unwrap();

        assert_eq!(store.saved.read()["10.0.0.1"], fast);
        assert_eq!(book.get("10.0.0.1"), fast);
    }
}
