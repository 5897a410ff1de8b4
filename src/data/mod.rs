//! Data models for node snapshots and their health.
//!
//! ## Submodules
//!
//! - [`duration`]: Parsing and formatting of duration strings (e.g., "30s", "500ms")
//! - [`health`]: Per-node limits ([`Threshold`]) and the status evaluator
//! - [`snapshot`]: The feed document ([`Snapshot`]) and node identity ([`NodeId`])
//!
//! ## Data Flow
//!
//! ```text
//! feed frame (JSON text)
//!        │
//!        ▼
//! Snapshot::from_frame()
//!        │
//!        ├──▶ Registry::upsert()            (latest snapshot per NodeId)
//!        │
//!        └──▶ health::evaluate(&Threshold)  (at read time, per row)
//! ```

pub mod duration;
pub mod health;
pub mod snapshot;

pub use health::{critical_reasons, evaluate, CriticalReason, HealthStatus, Threshold};
pub use snapshot::{CpuUsage, DiskUsage, LoadAverage, NodeId, Snapshot};
