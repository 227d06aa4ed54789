use crate::kind::MessageKind;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// One observed command or script invocation inside the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandHistoryItem {
    pub command: String,
    pub kind: MessageKind,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandHistoryItem {
    pub fn started(command: impl Into<String>, kind: MessageKind, at: DateTime<Utc>) -> Self {
        Self {
            command: command.into(),
            kind,
            start_time: at,
            end_time: None,
            duration_ms: None,
            status: CommandStatus::InProgress,
            error: None,
        }
    }

    /// Move to a terminal status. Only the first call has an effect; returns
    /// whether this call was it.
    pub fn finish(
        &mut self,
        status: CommandStatus,
        at: DateTime<Utc>,
        error: Option<String>,
    ) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }

        self.end_time = Some(at);
        self.status = status;
        self.error = error;
        self.duration_ms = self.duration().map(duration_to_ms);
        true
    }

    /// `end_time - start_time` when both are known.
    pub fn duration(&self) -> Option<Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}

/// Milliseconds with microsecond precision.
pub fn duration_to_ms(duration: Duration) -> f64 {
    match duration.num_microseconds() {
        Some(us) => us as f64 / 1_000.0,
        None => duration.num_milliseconds() as f64,
    }
}
