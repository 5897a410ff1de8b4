//! Per-node health evaluation.
//!
//! A node is critical when any single metric exceeds its limit. Each rule
//! is checked independently so callers can show every reason at once.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::snapshot::Snapshot;

/// Limits used to classify a node's health.
///
/// Missing fields in a stored record fall back to the defaults below.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    /// CPU utilisation (percent) above which the node is critical.
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: f64,
    /// Disk utilisation (percent) above which any mount makes the node critical.
    #[serde(default = "default_disk_limit")]
    pub disk_limit: f64,
    /// 1-minute load average above which the node is critical.
    #[serde(default = "default_load_limit")]
    pub load_limit: f64,
}

fn default_cpu_limit() -> f64 {
    80.0
}

fn default_disk_limit() -> f64 {
    90.0
}

fn default_load_limit() -> f64 {
    5.0
}

impl Default for Threshold {
    fn default() -> Self {
        Self {
            cpu_limit: default_cpu_limit(),
            disk_limit: default_disk_limit(),
            load_limit: default_load_limit(),
        }
    }
}

/// Health status for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Critical,
}

impl HealthStatus {
    /// Returns a short symbol for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "OK",
            HealthStatus::Critical => "CRIT",
        }
    }
}

/// Why a node was classified as critical.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "metric", rename_all = "lowercase")]
pub enum CriticalReason {
    Cpu { value: f64, limit: f64 },
    Load { value: f64, limit: f64 },
    Disk { mount: String, value: f64, limit: f64 },
}

impl fmt::Display for CriticalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CriticalReason::Cpu { value, limit } => {
                write!(f, "cpu {:.1}% > {:.1}%", value, limit)
            }
            CriticalReason::Load { value, limit } => {
                write!(f, "load1 {:.2} > {:.2}", value, limit)
            }
            CriticalReason::Disk { mount, value, limit } => {
                write!(f, "disk {} {:.1}% > {:.1}%", mount, value, limit)
            }
        }
    }
}

/// Collect every rule the snapshot violates.
///
/// Absent load data is unknown, not a violation.
pub fn critical_reasons(snapshot: &Snapshot, threshold: &Threshold) -> Vec<CriticalReason> {
    let mut reasons = Vec::new();

    if snapshot.cpu.total_percent > threshold.cpu_limit {
        reasons.push(CriticalReason::Cpu {
            value: snapshot.cpu.total_percent,
            limit: threshold.cpu_limit,
        });
    }

    if let Some(load) = snapshot.load {
        if load.load1 > threshold.load_limit {
            reasons.push(CriticalReason::Load {
                value: load.load1,
                limit: threshold.load_limit,
            });
        }
    }

    reasons.extend(
        snapshot
            .disk
            .iter()
            .filter(|d| d.used_percent > threshold.disk_limit)
            .map(|d| CriticalReason::Disk {
                mount: d.mount.clone(),
                value: d.used_percent,
                limit: threshold.disk_limit,
            }),
    );

    reasons
}

/// Classify a snapshot against its node's limits.
pub fn evaluate(snapshot: &Snapshot, threshold: &Threshold) -> HealthStatus {
    let cpu_hot = snapshot.cpu.total_percent > threshold.cpu_limit;
    let load_hot = matches!(snapshot.load, Some(load) if load.load1 > threshold.load_limit);
    let disk_full = snapshot
        .disk
        .iter()
        .any(|d| d.used_percent > threshold.disk_limit);

    if cpu_hot || load_hot || disk_full {
        HealthStatus::Critical
    } else {
        HealthStatus::Healthy
    }
}
