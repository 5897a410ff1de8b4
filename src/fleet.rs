//! Presentation-facing projection of the registry.
//!
//! Everything here is a pure function of a registry snapshot, the threshold
//! book, and the caller's viewport choices. Nothing in this module touches
//! shared state.

use std::time::Instant;

use serde::Serialize;

use crate::data::duration::format_duration;
use crate::data::{critical_reasons, CriticalReason, HealthStatus};
use crate::registry::RegistryEntry;
use crate::store::ThresholdBook;

/// Check whether a node identity matches a search query.
///
/// Case-insensitive substring match; an empty query matches everything.
pub fn matches_filter(identity: &str, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    identity.to_lowercase().contains(&query.to_lowercase())
}

/// Split an ordered list into consecutive columns of `rows_per_column` items.
///
/// The last column may be shorter. A `rows_per_column` of 0 is treated as 1.
/// Concatenating the columns reproduces the input.
pub fn columnize<T: Clone>(items: &[T], rows_per_column: usize) -> Vec<Vec<T>> {
    items
        .chunks(rows_per_column.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Filter entries by identity and order them by hostname.
///
/// Hostname ties are broken by identity so the order is deterministic.
pub fn filter_and_sort(mut entries: Vec<RegistryEntry>, query: &str) -> Vec<RegistryEntry> {
    entries.retain(|e| matches_filter(e.node_id().as_str(), query));
    entries.sort_by(|a, b| {
        a.snapshot
            .hostname
            .cmp(&b.snapshot.hostname)
            .then_with(|| a.node_id().cmp(b.node_id()))
    });
    entries
}

/// One node as shown to the user.
#[derive(Debug, Clone)]
pub struct FleetRow {
    pub entry: RegistryEntry,
    pub status: HealthStatus,
    pub reasons: Vec<CriticalReason>,
}

impl FleetRow {
    /// One-line text rendering used by the headless reporter.
    pub fn summary_line(&self, now: Instant) -> String {
        let snapshot = &self.entry.snapshot;
        let disk = snapshot.primary_disk();
        let load = snapshot
            .load
            .map(|l| format!("{:.2}", l.load1))
            .unwrap_or_else(|| "-".to_string());

        format!(
            "[{:<4}] {:<20} {:<15} cpu {:>5.1}%  disk {:>5.1}%  load {:>5}  seen {} ago",
            self.status.symbol(),
            snapshot.hostname,
            snapshot.node_id,
            snapshot.cpu.total_percent,
            disk.used_percent,
            load,
            format_duration(self.entry.age(now)),
        )
    }
}

/// Health counts across the rows of a view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FleetSummary {
    pub total: usize,
    pub healthy: usize,
    pub critical: usize,
}

/// Filtered, sorted, health-annotated rows.
#[derive(Debug, Clone, Default)]
pub struct FleetView {
    pub rows: Vec<FleetRow>,
}

impl FleetView {
    /// Build the view from a registry snapshot.
    pub fn build(entries: Vec<RegistryEntry>, thresholds: &ThresholdBook, query: &str) -> Self {
        let rows = filter_and_sort(entries, query)
            .into_iter()
            .map(|entry| {
                let threshold = thresholds.get(entry.node_id().as_str());
                let reasons = critical_reasons(&entry.snapshot, &threshold);
                let status = if reasons.is_empty() {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Critical
                };
                FleetRow {
                    entry,
                    status,
                    reasons,
                }
            })
            .collect();

        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn summary(&self) -> FleetSummary {
        let critical = self
            .rows
            .iter()
            .filter(|r| r.status == HealthStatus::Critical)
            .count();
        FleetSummary {
            total: self.rows.len(),
            healthy: self.rows.len() - critical,
            critical,
        }
    }

    /// Critical rows only, in view order.
    pub fn critical(&self) -> impl Iterator<Item = &FleetRow> {
        self.rows.iter().filter(|r| r.status == HealthStatus::Critical)
    }

    /// Rows split into display columns.
    pub fn columns(&self, rows_per_column: usize) -> Vec<Vec<FleetRow>> {
        columnize(&self.rows, rows_per_column)
    }

    /// Export the view as a JSON document (`summary` + `nodes`).
    pub fn to_export_json(&self, now: Instant) -> serde_json::Value {
        let nodes: Vec<serde_json::Value> = self
            .rows
            .iter()
            .map(|row| {
                let s = &row.entry.snapshot;
                serde_json::json!({
                    "ip": s.node_id,
                    "hostname": s.hostname,
                    "status": row.status,
                    "reasons": row.reasons,
                    "cpu": s.cpu,
                    "disk": s.disk,
                    "load": s.load,
                    "sender_timestamp": s.sender_timestamp,
                    "received_at": s.received_at.to_rfc3339(),
                    "age_ms": row.entry.age(now).as_millis() as u64,
                })
            })
            .collect();

        serde_json::json!({
            "summary": self.summary(),
            "nodes": nodes,
        })
    }
}
