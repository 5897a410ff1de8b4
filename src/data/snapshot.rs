//! Node snapshot types.
//!
//! These types match the JSON documents pushed by the node agents, one
//! document per feed message:
//!
//! ```json
//! {
//!   "ip": "10.0.0.7",
//!   "hostname": "web-07",
//!   "timestamp": 1718000000,
//!   "cpu": { "total_percent": 41.5 },
//!   "disk": [{ "mount": "/", "used_percent": 63.2, "used": 1024, "total": 2048 }],
//!   "load": { "load1": 0.82 }
//! }
//! ```

use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::FrameError;

/// Stable identity of a monitored node (its network address).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// CPU utilisation across all cores.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CpuUsage {
    pub total_percent: f64,
}

/// Usage of one mounted filesystem.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiskUsage {
    pub mount: String,
    pub used_percent: f64,
    /// Bytes in use, as reported.
    #[serde(rename = "used", default, deserialize_with = "null_as_default")]
    pub used_bytes: f64,
    /// Filesystem size in bytes, as reported.
    #[serde(rename = "total", default, deserialize_with = "null_as_default")]
    pub total_bytes: f64,
}

/// Load average as reported by the node. Only the 1-minute figure is used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub load1: f64,
}

/// One node's point-in-time metrics.
///
/// A snapshot always replaces the previous one for the same node in full;
/// fields are never merged across frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "ip")]
    pub node_id: NodeId,
    pub hostname: String,
    /// Sender clock, epoch seconds. Informational only.
    #[serde(rename = "timestamp", default, deserialize_with = "null_as_default")]
    pub sender_timestamp: f64,
    pub cpu: CpuUsage,
    /// Mounted filesystems in the order the agent reported them.
    #[serde(default, deserialize_with = "null_as_default")]
    pub disk: Vec<DiskUsage>,
    /// Absent when the agent's platform has no load average.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadAverage>,
    /// Ingestion-side wall clock, stamped when the frame is decoded.
    #[serde(skip_deserializing, default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

/// Treat an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Snapshot {
    /// Decode one feed message into a snapshot.
    pub fn from_frame(text: &str) -> Result<Self, FrameError> {
        let mut snapshot: Snapshot = serde_json::from_str(text)?;
        snapshot.received_at = Utc::now();
        Ok(snapshot)
    }

    /// Decode a binary feed message carrying a UTF-8 JSON document.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        Self::from_frame(std::str::from_utf8(bytes)?)
    }

    /// The disk shown in single-disk displays; a zeroed entry when none were reported.
    pub fn primary_disk(&self) -> DiskUsage {
        self.disk.first().cloned().unwrap_or_default()
    }

    /// The sender's timestamp, when it is a representable instant.
    pub fn sender_time(&self) -> Option<DateTime<Utc>> {
        if !self.sender_timestamp.is_finite() {
            return None;
        }
        let secs = self.sender_timestamp.floor();
        let nanos = ((self.sender_timestamp - secs) * 1e9) as u32;
        if secs < i64::MIN as f64 || secs > i64::MAX as f64 {
            return None;
        }
        Utc.timestamp_opt(secs as i64, nanos).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "ip": "10.0.0.7",
            "hostname": "web-07",
            "timestamp": 1718000000.5,
            "cpu": {"total_percent": 41.5},
            "disk": [
                {"mount": "/", "used_percent": 63.2, "used": 1024, "total": 2048},
                {"mount": "/data", "used_percent": 12.0, "used": 10, "total": 100}
            ],
            "load": {"load1": 0.82}
        }"#
    }

    #[test]
    fn test_decode_full_frame() {
        let snapshot = Snapshot::from_frame(sample_json()).unwrap();
        assert_eq!(snapshot.node_id.as_str(), "10.0.0.7");
        assert_eq!(snapshot.hostname, "web-07");
        assert_eq!(snapshot.cpu.total_percent, 41.5);
        assert_eq!(snapshot.disk.len(), 2);
        assert_eq!(snapshot.disk[0].used_bytes, 1024.0);
        assert_eq!(snapshot.disk[0].total_bytes, 2048.0);
        assert_eq!(snapshot.load, Some(LoadAverage { load1: 0.82 }));
    }

    #[test]
    fn test_missing_load_and_disk() {
        let json = r#"{"ip": "10.0.0.8", "hostname": "db-01", "timestamp": 0, "cpu": {"total_percent": 3}}"#;
        let snapshot = Snapshot::from_frame(json).unwrap();
        assert!(snapshot.load.is_none());
        assert!(snapshot.disk.is_empty());

        let primary = snapshot.primary_disk();
        assert_eq!(primary.used_percent, 0.0);
        assert_eq!(primary.total_bytes, 0.0);
        assert!(primary.mount.is_empty());
    }

    #[test]
    fn test_received_at_ignores_wire_value() {
        let before = Utc::now();
        let snapshot = Snapshot::from_frame(sample_json()).unwrap();
        assert!(snapshot.received_at >= before);
        assert_eq!(snapshot.sender_time().unwrap().timestamp(), 1_718_000_000);
    }

    #[test]
    fn test_out_of_range_percent_passes_through() {
        let json = r#"{"ip": "a", "hostname": "a", "cpu": {"total_percent": -12.5},
                       "disk": [{"mount": "/", "used_percent": 140}]}"#;
        let snapshot = Snapshot::from_frame(json).unwrap();
        assert_eq!(snapshot.cpu.total_percent, -12.5);
        assert_eq!(snapshot.disk[0].used_percent, 140.0);
    }

    #[test]
    fn test_odd_byte_counts_pass_through() {
        let json = r#"{"ip": "10.0.0.9", "hostname": "odd", "cpu": {"total_percent": 95},
                       "disk": [{"mount": "/", "used_percent": 50, "used": -1, "total": 2048.5}]}"#;
        let snapshot = Snapshot::from_frame(json).unwrap();
        assert_eq!(snapshot.cpu.total_percent, 95.0);
        assert_eq!(snapshot.disk[0].used_bytes, -1.0);
        assert_eq!(snapshot.disk[0].total_bytes, 2048.5);
    }

    #[test]
    fn test_null_timestamp_reads_as_zero() {
        let json = r#"{"ip": "10.0.0.9", "hostname": "n", "timestamp": null, "cpu": {"total_percent": 5}}"#;
        let snapshot = Snapshot::from_frame(json).unwrap();
        assert_eq!(snapshot.sender_timestamp, 0.0);
    }

    #[test]
    fn test_null_disk_and_load_read_as_absent() {
        let json = r#"{"ip": "10.0.0.9", "hostname": "n", "cpu": {"total_percent": 5},
                       "disk": null, "load": null}"#;
        let snapshot = Snapshot::from_frame(json).unwrap();
        assert!(snapshot.disk.is_empty());
        assert!(snapshot.load.is_none());

        let json = r#"{"ip": "10.0.0.9", "hostname": "n", "cpu": {"total_percent": 5},
                       "disk": [{"mount": "/", "used_percent": 1, "used": null, "total": null}]}"#;
        let snapshot = Snapshot::from_frame(json).unwrap();
        assert_eq!(snapshot.disk[0].total_bytes, 0.0);
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        assert!(Snapshot::from_frame("not json").is_err());
        assert!(Snapshot::from_frame(r#"{"hostname": "no-ip"}"#).is_err());
        assert!(Snapshot::from_bytes(&[0xff, 0xfe]).is_err());
    }
}
