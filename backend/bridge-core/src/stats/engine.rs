//! Correlation of start/end envelopes into command history and session
//! statistics.
//!
//! The engine is plain data behind `&mut self`. Every operation that depends
//! on the current time has an `_at` form taking it explicitly.

use crate::stats::categorize::categorize;

use models::history::duration_to_ms;
use models::{
    CommandHistoryItem, CommandStatus, Envelope, MessageKind, Payload, SessionExport,
    SessionStatistics,
};

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use log::debug;

/// Identifier used when an envelope names no command or script.
pub const UNKNOWN_IDENTIFIER: &str = "Unknown";

/// Error text recorded for a `command_failed` that carries none.
pub const DEFAULT_FAILURE_TEXT: &str = "Command failed";

const MS_PER_MINUTE: f64 = 60_000.0;

#[derive(Debug, Clone)]
struct InFlight {
    /// Position of the item in the overall insertion order.
    sequence: u64,
    started: DateTime<Utc>,
}

#[derive(Debug)]
pub struct StatisticsEngine {
    max_history: usize,
    session_start: DateTime<Utc>,
    in_flight: HashMap<String, InFlight>,
    history: VecDeque<CommandHistoryItem>,
    /// Items ever evicted from the front of `history`.
    evicted: u64,
    error_patterns: BTreeMap<String, u64>,
    command_count: u64,
    error_count: u64,
    timed_count: u64,
    total_duration_ms: f64,
}

impl StatisticsEngine {
    pub fn new(max_history: usize) -> Self {
        Self::starting_at(max_history, Utc::now())
    }

    pub fn starting_at(max_history: usize, session_start: DateTime<Utc>) -> Self {
        Self {
            max_history: max_history.max(1),
            session_start,
            in_flight: HashMap::new(),
            history: VecDeque::new(),
            evicted: 0,
            error_patterns: BTreeMap::new(),
            command_count: 0,
            error_count: 0,
            timed_count: 0,
            total_duration_ms: 0.0,
        }
    }

    /// Fold one envelope into the session. Returns whether anything changed.
    pub fn apply(&mut self, envelope: &Envelope) -> bool {
        let identifier = envelope.identifier().unwrap_or(UNKNOWN_IDENTIFIER);

        match &envelope.payload {
            Payload::CommandStart { .. } => {
                self.start(identifier, MessageKind::CommandStart, envelope.timestamp)
            }
            Payload::ScriptStart { .. } => {
                self.start(identifier, MessageKind::ScriptStart, envelope.timestamp)
            }
            Payload::CommandEnd { .. } | Payload::ScriptEnd { .. } => {
                self.finish(identifier, CommandStatus::Completed, envelope.timestamp, None)
            }
            Payload::CommandCancelled { .. } | Payload::ScriptCancelled { .. } => {
                self.finish(identifier, CommandStatus::Cancelled, envelope.timestamp, None)
            }
            Payload::CommandFailed { error, .. } => {
                let text = error.as_deref().unwrap_or(DEFAULT_FAILURE_TEXT);
                self.finish(
                    identifier,
                    CommandStatus::Failed,
                    envelope.timestamp,
                    Some(text.to_string()),
                );
                self.record_error(text);
            }
            Payload::Error { message } => self.record_error(message),
            _ => return false,
        }

        true
    }

    fn start(&mut self, identifier: &str, kind: MessageKind, at: DateTime<Utc>) {
        let sequence = self.evicted + self.history.len() as u64;

        // A second start for the same identifier replaces the first in the
        // in-flight map; the earlier item stays `InProgress` in history.
        if self
            .in_flight
            .insert(identifier.to_string(), InFlight { sequence, started: at })
            .is_some()
        {
            debug!("Duplicate start for {identifier}; earlier invocation left in progress");
        }

        self.history
            .push_back(CommandHistoryItem::started(identifier, kind, at));
        while self.history.len() > self.max_history {
            self.history.pop_front();
            self.evicted += 1;
        }

        self.command_count += 1;
    }

    fn finish(
        &mut self,
        identifier: &str,
        status: CommandStatus,
        at: DateTime<Utc>,
        error: Option<String>,
    ) {
        let Some(flight) = self.in_flight.remove(identifier) else {
            debug!("No in-flight {identifier} for {status:?}; statistics only");
            return;
        };

        if let Some(item) = self.history_item_mut(flight.sequence) {
            item.finish(status, at, error);
        }

        let duration_ms = duration_to_ms(at - flight.started).max(0.0);
        self.total_duration_ms += duration_ms;
        self.timed_count += 1;
    }

    fn record_error(&mut self, text: &str) {
        self.error_count += 1;
        *self
            .error_patterns
            .entry(categorize(text).to_string())
            .or_insert(0) += 1;
    }

    fn history_item_mut(&mut self, sequence: u64) -> Option<&mut CommandHistoryItem> {
        let index = sequence.checked_sub(self.evicted)?;
        self.history.get_mut(usize::try_from(index).ok()?)
    }

    /// Clear everything and restart the session clock at `now`.
    pub fn reset_at(&mut self, now: DateTime<Utc>) {
        *self = Self::starting_at(self.max_history, now);
    }

    pub fn reset(&mut self) {
        self.reset_at(Utc::now());
    }

    pub fn statistics_at(&self, now: DateTime<Utc>) -> SessionStatistics {
        let elapsed_ms = (now - self.session_start).num_milliseconds().max(0);

        SessionStatistics {
            session_start: self.session_start,
            session_duration_ms: elapsed_ms,
            command_count: self.command_count,
            error_count: self.error_count,
            error_rate: self.error_rate(),
            average_duration_ms: self.average_duration_ms(),
            commands_per_minute: self.commands_per_minute(elapsed_ms),
        }
    }

    pub fn statistics(&self) -> SessionStatistics {
        self.statistics_at(Utc::now())
    }

    /// Immutable snapshot of the whole session.
    pub fn export_at(&self, now: DateTime<Utc>) -> SessionExport {
        let statistics = self.statistics_at(now);

        SessionExport {
            session_start: statistics.session_start,
            session_end: now,
            command_count: statistics.command_count,
            error_count: statistics.error_count,
            error_rate: statistics.error_rate,
            average_duration_ms: statistics.average_duration_ms,
            commands_per_minute: statistics.commands_per_minute,
            error_patterns: self.error_patterns.clone(),
            command_history: self.history.iter().cloned().collect(),
        }
    }

    pub fn export(&self) -> SessionExport {
        self.export_at(Utc::now())
    }

    pub fn history(&self) -> impl Iterator<Item = &CommandHistoryItem> {
        self.history.iter()
    }

    pub fn error_patterns(&self) -> &BTreeMap<String, u64> {
        &self.error_patterns
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    fn error_rate(&self) -> f64 {
        if self.command_count == 0 {
            return 0.0;
        }
        self.error_count as f64 / self.command_count as f64 * 100.0
    }

    fn average_duration_ms(&self) -> f64 {
        if self.timed_count == 0 {
            return 0.0;
        }
        self.total_duration_ms / self.timed_count as f64
    }

    fn commands_per_minute(&self, elapsed_ms: i64) -> f64 {
        if elapsed_ms <= 0 {
            return 0.0;
        }
        self.command_count as f64 / (elapsed_ms as f64 / MS_PER_MINUTE)
    }
}
