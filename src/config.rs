//! Runtime settings.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `FLEETWATCH_*` environment variables. The CLI applies its own overrides on
//! top of the result.
//!
//! ```toml
//! feed_url = "ws://10.0.0.2:8765/ws"
//! reconnect_delay = "5s"
//! eviction_interval = "10s"
//! node_ttl = "30s"
//! refresh_interval = "2s"
//!
//! [threshold_store]
//! kind = "http"
//! endpoint = "http://dashboard.local:8000/api"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::data::duration::parse_duration;
use crate::store::{FileThresholdStore, HttpThresholdStore, MemoryThresholdStore, ThresholdStore};

/// Which threshold store backs the threshold book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Thresholds live only in this process.
    #[default]
    Memory,
    File,
    Http,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub kind: StoreKind,
    /// JSON file for `kind = "file"`.
    pub path: Option<PathBuf>,
    /// API base URL for `kind = "http"`.
    pub endpoint: Option<String>,
    /// Request timeout for `kind = "http"`, e.g. "10s".
    pub timeout: Option<String>,
}

impl StoreSettings {
    /// Construct the configured store.
    pub fn build(&self) -> Result<Box<dyn ThresholdStore>> {
        match self.kind {
            StoreKind::Memory => Ok(Box::new(MemoryThresholdStore::new())),
            StoreKind::File => {
                let path = self
                    .path
                    .as_ref()
                    .context("threshold_store.path is required when kind = \"file\"")?;
                Ok(Box::new(FileThresholdStore::new(path)))
            }
            StoreKind::Http => {
                let endpoint = self
                    .endpoint
                    .as_ref()
                    .context("threshold_store.endpoint is required when kind = \"http\"")?;
                let mut builder = HttpThresholdStore::builder().endpoint(endpoint);
                if let Some(ref timeout) = self.timeout {
                    builder = builder.timeout(parse_duration(timeout)?);
                }
                Ok(Box::new(builder.build()?))
            }
        }
    }
}

/// Raw settings as read from file and environment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
struct RawSettings {
    feed_url: String,
    reconnect_delay: String,
    eviction_interval: String,
    node_ttl: String,
    refresh_interval: String,
    threshold_store: StoreSettings,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            feed_url: "ws://127.0.0.1:8765/ws".to_string(),
            reconnect_delay: "5s".to_string(),
            eviction_interval: "10s".to_string(),
            node_ttl: "30s".to_string(),
            refresh_interval: "2s".to_string(),
            threshold_store: StoreSettings::default(),
        }
    }
}

/// Validated settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Streaming feed endpoint.
    pub feed_url: String,
    /// Flat delay between a feed close and the next connect.
    pub reconnect_delay: Duration,
    /// Period of the stale-node sweep.
    pub eviction_interval: Duration,
    /// Age after which a silent node is evicted.
    pub node_ttl: Duration,
    /// How often the reporter logs the fleet.
    pub refresh_interval: Duration,
    pub threshold_store: StoreSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            feed_url: "ws://127.0.0.1:8765/ws".to_string(),
            reconnect_delay: Duration::from_secs(5),
            eviction_interval: Duration::from_secs(10),
            node_ttl: Duration::from_secs(30),
            refresh_interval: Duration::from_secs(2),
            threshold_store: StoreSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from an optional file plus `FLEETWATCH_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(
                Environment::with_prefix("FLEETWATCH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to read settings")?;

        let raw: RawSettings = config.try_deserialize().context("Invalid settings")?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self> {
        let duration = |name: &str, value: &str| {
            parse_duration(value).with_context(|| format!("Invalid {}: {}", name, value))
        };

        let settings = Self {
            feed_url: raw.feed_url,
            reconnect_delay: duration("reconnect_delay", &raw.reconnect_delay)?,
            eviction_interval: duration("eviction_interval", &raw.eviction_interval)?,
            node_ttl: duration("node_ttl", &raw.node_ttl)?,
            refresh_interval: duration("refresh_interval", &raw.refresh_interval)?,
            threshold_store: raw.threshold_store,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Periodic timers need a non-zero period.
    pub fn validate(&self) -> Result<()> {
        if self.eviction_interval.is_zero() {
            bail!("eviction_interval must be greater than zero");
        }
        if self.refresh_interval.is_zero() {
            bail!("refresh_interval must be greater than zero");
        }
        Ok(())
    }
}
