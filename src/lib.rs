//! # fleetwatch
//!
//! A live fleet-telemetry registry and headless monitor.
//!
//! Node agents push JSON snapshots (CPU, disks, load average) over a single
//! streaming feed. This crate keeps the latest snapshot per node, forgets
//! nodes that go silent, and classifies each node as healthy or critical
//! against per-node limits kept in an external threshold store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Fleet (app)                         │
//! │                                                              │
//! │  ┌───────────┐  frames  ┌────────────┐  entries ┌─────────┐  │
//! │  │  source   │─────────▶│  registry  │─────────▶│  fleet  │  │
//! │  │ (client)  │          │ (+evictor) │          │ (view)  │  │
//! │  └─────┬─────┘          └────────────┘          └────┬────┘  │
//! │        │                                             │       │
//! │        ▼                                             ▼       │
//! │  WebSocketConnector                        ┌──────────────┐  │
//! │                                            │    store     │  │
//! │                                            │ (thresholds) │  │
//! │                                            └──────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`source`]**: the feed transport ([`Connector`]) and the reconnecting
//!   [`StreamClient`] that turns frames into registry upserts
//! - **[`registry`]**: latest snapshot per node plus the periodic stale-node sweep
//! - **[`data`]**: snapshot types, thresholds and the health evaluator
//! - **[`store`]**: durable per-node thresholds ([`ThresholdStore`]) and the
//!   in-memory [`ThresholdBook`]
//! - **[`fleet`]**: filtering, ordering and column layout of the registry for display
//! - **[`app`]**: [`Fleet`], which owns all of the above for one monitor instance
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Log a fleet report every 2 seconds until Ctrl-C
//! fleetwatch --url ws://10.0.0.2:8765/ws
//!
//! # Collect for 15 seconds and write the fleet state to a file
//! fleetwatch --url ws://10.0.0.2:8765/ws --export fleet.json --collect-for 15s
//!
//! # Store a custom CPU limit for one node
//! fleetwatch --config fleetwatch.toml --set-threshold 10.0.0.7 --cpu-limit 95
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleetwatch::{Fleet, MemoryThresholdStore, Settings, WebSocketConnector};
//!
//! # tokio_test::block_on(async {
//! let settings = Settings::default();
//! let connector = Arc::new(WebSocketConnector::new(settings.feed_url.clone()));
//! let fleet = Fleet::start(&settings, connector, Box::new(MemoryThresholdStore::new())).await;
//!
//! for row in fleet.view("10.0.").critical() {
//!     println!("{} is critical", row.entry.snapshot.hostname);
//! }
//!
//! fleet.shutdown().await;
//! # });
//! ```

pub mod app;
pub mod config;
pub mod data;
pub mod error;
pub mod fleet;
pub mod registry;
pub mod source;
pub mod store;

pub use app::Fleet;
pub use config::Settings;
pub use data::{evaluate, HealthStatus, NodeId, Snapshot, Threshold};
pub use error::{FeedError, FrameError, StoreError};
pub use fleet::{columnize, FleetView};
pub use registry::{Registry, RegistryEntry};
pub use source::{ConnectionState, Connector, StreamClient, WebSocketConnector};
pub use store::{MemoryThresholdStore, ThresholdBook, ThresholdStore};
