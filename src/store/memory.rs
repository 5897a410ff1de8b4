//! In-process threshold store.
//!
//! Used when no external store is configured; thresholds then last only as
//! long as the process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::ThresholdStore;
use crate::data::{NodeId, Threshold};
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct MemoryThresholdStore {
    thresholds: RwLock<HashMap<NodeId, Threshold>>,
    failing: AtomicBool,
}

impl MemoryThresholdStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<NodeId>, threshold: Threshold) {
        self.thresholds.write().insert(id.into(), threshold);
    }

    pub fn get(&self, id: &str) -> Option<Threshold> {
        self.thresholds.read().get(id).copied()
    }

    /// Make every subsequent call fail, simulating an unreachable store.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::Relaxed) {
            Err(StoreError::Rejected("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ThresholdStore for MemoryThresholdStore {
    async fn fetch_all(&self) -> Result<HashMap<NodeId, Threshold>, StoreError> {
        self.check()?;
        Ok(self.thresholds.read().clone())
    }

    async fn save(&self, id: &NodeId, threshold: &Threshold) -> Result<(), StoreError> {
        self.check()?;
        self.thresholds.write().insert(id.clone(), *threshold);
        Ok(())
    }

    fn description(&self) -> &str {
        "memory"
    }
}
