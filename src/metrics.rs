//! Operation counters for sends, collections, and exports.
//!
//! Flat per-operation counters with cumulative totals, alongside small
//! timing helpers for duration accounting.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Operations tracked when collecting metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Send,
    Collect,
    Export,
}

/// How a single operation ended. A `Warning` still delivered a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Success,
    Warning,
    Failure,
}

/// Aggregated counters across all automation operations.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChorusMetrics {
    pub send_attempts: u64,
    pub send_successes: u64,
    pub send_warnings: u64,
    pub send_duration_ms: u64,

    pub collect_attempts: u64,
    pub collect_successes: u64,
    pub collect_warnings: u64,
    pub collect_duration_ms: u64,

    pub export_attempts: u64,
    pub export_successes: u64,
    pub export_warnings: u64,
    pub export_duration_ms: u64,

    pub total_attempts: u64,
    pub total_successes: u64,
    pub total_warnings: u64,
    pub total_duration_ms: u64,
}

impl ChorusMetrics {
    /// Merge the values from another metrics instance into this one.
    pub fn merge(&mut self, other: &ChorusMetrics) {
        self.send_attempts += other.send_attempts;
        self.send_successes += other.send_successes;
        self.send_warnings += other.send_warnings;
        self.send_duration_ms += other.send_duration_ms;

        self.collect_attempts += other.collect_attempts;
        self.collect_successes += other.collect_successes;
        self.collect_warnings += other.collect_warnings;
        self.collect_duration_ms += other.collect_duration_ms;

        self.export_attempts += other.export_attempts;
        self.export_successes += other.export_successes;
        self.export_warnings += other.export_warnings;
        self.export_duration_ms += other.export_duration_ms;

        self.total_attempts += other.total_attempts;
        self.total_successes += other.total_successes;
        self.total_warnings += other.total_warnings;
        self.total_duration_ms += other.total_duration_ms;
    }

    /// Record one finished operation and update cumulative totals.
    pub fn record(&mut self, operation: OperationKind, disposition: Disposition, duration_ms: u64) {
        let success = u64::from(disposition == Disposition::Success);
        let warning = u64::from(disposition == Disposition::Warning);

        match operation {
            OperationKind::Send => {
                self.send_attempts += 1;
                self.send_successes += success;
                self.send_warnings += warning;
                self.send_duration_ms += duration_ms;
            }
            OperationKind::Collect => {
                self.collect_attempts += 1;
                self.collect_successes += success;
                self.collect_warnings += warning;
                self.collect_duration_ms += duration_ms;
            }
            OperationKind::Export => {
                self.export_attempts += 1;
                self.export_successes += success;
                self.export_warnings += warning;
                self.export_duration_ms += duration_ms;
            }
        }

        self.total_attempts += 1;
        self.total_successes += success;
        self.total_warnings += warning;
        self.total_duration_ms += duration_ms;
    }

    /// Attempts that neither succeeded nor degraded to a warning.
    pub fn total_failures(&self) -> u64 {
        self.total_attempts - self.total_successes - self.total_warnings
    }
}

/// Start an operation timer using [`Instant::now`].
pub fn start_operation_timer() -> Instant {
    Instant::now()
}

/// Elapsed milliseconds since the provided start instant, saturating on
/// overflow.
pub fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
