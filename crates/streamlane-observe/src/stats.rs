//! Per-lane statistics.

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use streamlane_core::{EndState, EventKind, EventRecord, EventSink};

/// Counters for one lane.
///
/// Subscription counters only move when the lane's filter includes
/// subscription records, value and terminal counters only when it includes
/// event records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneStats {
    /// Subscriptions begun.
    pub subscriptions: u64,
    /// Subscriptions ended, for any reason.
    pub ended: u64,
    /// Values emitted.
    pub values: u64,
    /// Completions.
    pub completions: u64,
    /// Failures.
    pub errors: u64,
    /// Cancellations.
    pub cancellations: u64,
    /// Description of the most recent failure.
    pub last_error: Option<String>,
}

impl LaneStats {
    /// Subscriptions begun but not yet ended.
    pub fn active(&self) -> u64 {
        self.subscriptions.saturating_sub(self.ended)
    }

    fn record(&mut self, record: &EventRecord) {
        match record.kind() {
            EventKind::SubscriptionBegin => self.subscriptions += 1,
            EventKind::Value => self.values += 1,
            EventKind::Completion => self.completions += 1,
            EventKind::Error => {
                self.errors += 1;
                self.last_error = record.payload().map(str::to_string);
            }
            EventKind::Cancelled => self.cancellations += 1,
            EventKind::SubscriptionEnd(state) => {
                self.ended += 1;
                if let EndState::Error(description) = state {
                    self.last_error = Some(description.clone());
                }
            }
        }
    }
}

/// A sink that counts records per lane.
#[derive(Debug, Default)]
pub struct StatsSink {
    lanes: DashMap<String, LaneStats>,
}

impl StatsSink {
    /// Create an empty statistics sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters of one lane.
    pub fn lane(&self, name: &str) -> Option<LaneStats> {
        self.lanes.get(name).map(|stats| stats.clone())
    }

    /// Get a snapshot of all lanes.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lanes: self
                .lanes
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        }
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.lanes.clear();
    }
}

impl EventSink for StatsSink {
    fn on_record(&self, record: &EventRecord) {
        self.lanes
            .entry(record.lane().to_string())
            .or_default()
            .record(record);
    }

    fn name(&self) -> &'static str {
        "stats"
    }
}

/// Snapshot of per-lane counters, ordered by lane name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Counters by lane name.
    pub lanes: BTreeMap<String, LaneStats>,
}

impl StatsSnapshot {
    /// Format as human-readable text.
    pub fn to_text(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Lanes: {}\n", self.lanes.len()));
        for (name, stats) in &self.lanes {
            output.push_str(&format!("\n{}\n", name));
            output.push_str(&format!(
                "  Subscriptions: {} ({} active)\n",
                stats.subscriptions,
                stats.active()
            ));
            output.push_str(&format!("  Values: {}\n", stats.values));
            output.push_str(&format!(
                "  Completed: {}  Errors: {}  Cancelled: {}\n",
                stats.completions, stats.errors, stats.cancellations
            ));
            if let Some(error) = &stats.last_error {
                output.push_str(&format!("  Last Error: {}\n", error));
            }
        }

        output
    }

    /// Format as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Format as pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
