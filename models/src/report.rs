use crate::history::CommandHistoryItem;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derived session figures, without the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub session_start: DateTime<Utc>,
    pub session_duration_ms: i64,
    pub command_count: u64,
    pub error_count: u64,
    /// Percentage of commands that produced an error, `0.0` with no commands.
    pub error_rate: f64,
    /// Mean over commands whose duration is known, `0.0` when none are.
    pub average_duration_ms: f64,
    pub commands_per_minute: f64,
}

/// Point-in-time session report written by `export`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExport {
    pub session_start: DateTime<Utc>,
    pub session_end: DateTime<Utc>,
    pub command_count: u64,
    pub error_count: u64,
    pub error_rate: f64,
    pub average_duration_ms: f64,
    pub commands_per_minute: f64,
    pub error_patterns: BTreeMap<String, u64>,
    pub command_history: Vec<CommandHistoryItem>,
}

impl SessionExport {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
