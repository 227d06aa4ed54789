use crate::stats::engine::DEFAULT_FAILURE_TEXT;

use models::{Envelope, Payload};

use chrono::{DateTime, Duration, Utc};

/// What the external side can tell about its link to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkStatus {
    NotConnected,
    Connected,
    /// Connected, but nothing has arrived since `since`.
    PeerSilent { since: DateTime<Utc> },
    /// The most recent message from the host was a failure report.
    HostReportedFailure { message: String, at: DateTime<Utc> },
}

/// Inputs for [`LinkStatus`], fed by the monitor's draining task.
#[derive(Debug, Default)]
pub struct LinkTracker {
    connected_at: Option<DateTime<Utc>>,
    last_inbound: Option<DateTime<Utc>>,
    last_failure: Option<(String, DateTime<Utc>)>,
}

impl LinkTracker {
    pub fn connected(&mut self, at: DateTime<Utc>) {
        *self = Self {
            connected_at: Some(at),
            ..Self::default()
        };
    }

    pub fn disconnected(&mut self) {
        *self = Self::default();
    }

    /// Record an envelope received at `at` (local receive time, not the
    /// envelope's own timestamp).
    pub fn observe(&mut self, envelope: &Envelope, at: DateTime<Utc>) {
        self.last_inbound = Some(at);

        self.last_failure = match &envelope.payload {
            Payload::Error { message } => Some((message.clone(), at)),
            Payload::CommandFailed { command, error } => Some((
                format!(
                    "{command}: {}",
                    error.as_deref().unwrap_or(DEFAULT_FAILURE_TEXT)
                ),
                at,
            )),
            _ => None,
        };
    }

    pub fn status_at(&self, now: DateTime<Utc>, silence: Duration) -> LinkStatus {
        let Some(connected_at) = self.connected_at else {
            return LinkStatus::NotConnected;
        };

        if let Some((message, at)) = &self.last_failure {
            return LinkStatus::HostReportedFailure {
                message: message.clone(),
                at: *at,
            };
        }

        let last_heard = self.last_inbound.unwrap_or(connected_at);
        if now - last_heard > silence {
            return LinkStatus::PeerSilent { since: last_heard };
        }

        LinkStatus::Connected
    }
}
