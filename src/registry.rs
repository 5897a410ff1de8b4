//! The live node registry.
//!
//! Holds the latest [`Snapshot`] per node together with the local instant it
//! arrived. Entries are only ever removed by age-based eviction; a feed
//! disconnect leaves them in place so a short outage does not blank the view.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::data::{NodeId, Snapshot};

/// Default maximum age before a node is considered gone.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Default period of the eviction sweep.
pub const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_secs(10);

/// Current instant on the runtime clock, so a paused test clock drives eviction too.
pub fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// A node's last known state.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub snapshot: Snapshot,
    /// Local monotonic time of the upsert; independent of the sender's clock.
    pub last_seen: Instant,
}

impl RegistryEntry {
    pub fn node_id(&self) -> &NodeId {
        &self.snapshot.node_id
    }

    /// Time since this node last reported, as of `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}

/// Thread-safe map of node identity to latest snapshot.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Mutex<HashMap<NodeId, RegistryEntry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or fully replace the entry for the snapshot's node.
    pub fn upsert(&self, snapshot: Snapshot) {
        self.upsert_at(snapshot, now());
    }

    /// Like [`upsert`](Self::upsert) with an explicit arrival instant.
    pub fn upsert_at(&self, snapshot: Snapshot, seen: Instant) {
        let id = snapshot.node_id.clone();
        let entry = RegistryEntry {
            snapshot,
            last_seen: seen,
        };
        self.entries.lock().insert(id, entry);
    }

    /// Remove every entry older than `ttl` as of `now`.
    ///
    /// An entry exactly `ttl` old survives. Returns the number removed.
    pub fn evict_stale(&self, now: Instant, ttl: Duration) -> usize {
        let evicted: Vec<NodeId> = {
            let mut entries = self.entries.lock();
            let stale: Vec<NodeId> = entries
                .iter()
                .filter(|(_, e)| e.age(now) > ttl)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &stale {
                entries.remove(id);
            }
            stale
        };

        for id in &evicted {
            tracing::debug!(node = %id, "Evicted stale node");
        }
        evicted.len()
    }

    /// Point-in-time copy of all entries. The lock is released before returning.
    pub fn snapshot(&self) -> Vec<RegistryEntry> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<RegistryEntry> {
        self.entries.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Start the periodic eviction sweep.
    ///
    /// The first sweep runs one `interval` after start. Returns a handle that
    /// stops the sweep; no eviction happens once `shutdown` has returned.
    pub fn spawn_evictor(self: Arc<Self>, interval: Duration, ttl: Duration) -> EvictionHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut timer = tokio::time::interval_at(start, interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = timer.tick() => {
                        let removed = self.evict_stale(now(), ttl);
                        if removed > 0 {
                            tracing::info!(removed, remaining = self.len(), "Evicted stale nodes");
                        }
                    }
                }
            }
            tracing::debug!("Eviction sweep stopped");
        });

        EvictionHandle {
            stop_tx,
            task: Some(task),
        }
    }
}

/// Handle for the background eviction sweep.
///
/// Dropping the handle also stops the sweep.
#[derive(Debug)]
pub struct EvictionHandle {
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl EvictionHandle {
    /// Signal the sweep to stop without waiting for it.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stop the sweep and wait until its task has exited.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for EvictionHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CpuUsage, DiskUsage};
    use chrono::Utc;

    fn snap(id: &str, host: &str, cpu: f64) -> Snapshot {
        Snapshot {
            node_id: NodeId::from(id),
            hostname: host.to_string(),
            sender_timestamp: 0.0,
            cpu: CpuUsage { total_percent: cpu },
            disk: vec![DiskUsage {
                mount: "/".to_string(),
                used_percent: 10.0,
                used_bytes: 1.0,
                total_bytes: 10.0,
            }],
            load: None,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_upsert_last_write_wins() {
        let registry = Registry::new();
        registry.upsert(snap("10.0.0.1", "a", 10.0));
        registry.upsert(snap("10.0.0.1", "a", 20.0));
        registry.upsert(snap("10.0.0.1", "a", 30.0));

        assert_eq!(registry.len(), 1);
        let entry = registry.get("10.0.0.1").unwrap();
        assert_eq!(entry.snapshot.cpu.total_percent, 30.0);
    }

    #[test]
    fn test_upsert_replaces_without_merging() {
        let registry = Registry::new();
        registry.upsert(snap("10.0.0.1", "a", 10.0));

        let mut without_disk = snap("10.0.0.1", "a", 11.0);
        without_disk.disk.clear();
        registry.upsert(without_disk);

        assert!(registry.get("10.0.0.1").unwrap().snapshot.disk.is_empty());
    }

    #[test]
    fn test_evict_stale_boundaries() {
        let registry = Registry::new();
        let base = Instant::now();
        registry.upsert_at(snap("old", "old", 1.0), base);
        registry.upsert_at(snap("fresh", "fresh", 1.0), base + Duration::from_secs(2));

        // old is 31s old, fresh is 29s old
        let now = base + Duration::from_secs(31);
        let removed = registry.evict_stale(now, DEFAULT_TTL);

        assert_eq!(removed, 1);
        assert!(registry.get("old").is_none());
        assert!(registry.get("fresh").is_some());
    }

    #[test]
    fn test_entry_exactly_ttl_old_survives() {
        let registry = Registry::new();
        let base = Instant::now();
        registry.upsert_at(snap("edge", "edge", 1.0), base);
        assert_eq!(registry.evict_stale(base + DEFAULT_TTL, DEFAULT_TTL), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_upsert_refreshes_last_seen() {
        let registry = Registry::new();
        let base = Instant::now();
        registry.upsert_at(snap("n", "n", 1.0), base);
        registry.upsert_at(snap("n", "n", 2.0), base + Duration::from_secs(20));

        registry.evict_stale(base + Duration::from_secs(40), DEFAULT_TTL);
        assert_eq!(registry.get("n").unwrap().snapshot.cpu.total_percent, 2.0);
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let registry = Registry::new();
        registry.upsert(snap("a", "a", 1.0));
        registry.upsert(snap("b", "b", 1.0));

        let copy = registry.snapshot();
        registry.evict_stale(Instant::now() + Duration::from_secs(60), DEFAULT_TTL);

        assert_eq!(copy.len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_upserts_and_eviction() {
        let registry = Arc::new(Registry::new());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        registry.upsert(snap(&format!("node-{}", w), "h", i as f64));
                    }
                })
            })
            .collect();
        let sweeper = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    registry.evict_stale(Instant::now(), DEFAULT_TTL);
                    let _ = registry.snapshot();
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        sweeper.join().unwrap();

        assert_eq!(registry.len(), 4);
        for w in 0..4 {
            let entry = registry.get(&format!("node-{}", w)).unwrap();
            assert_eq!(entry.snapshot.cpu.total_percent, 499.0);
        }
    }
}
