use std::fmt::{Display, Formatter, Result as FormatResult};

/// Host-side endpoint lifecycle.
///
/// `Idle → Listening → Connected → Listening → …` until shutdown moves it to
/// the terminal `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Listening,
    Connected,
    Stopped,
}

/// External-side endpoint lifecycle. No implicit loop: leaving `Connected`
/// always lands in `Disconnected` until the caller connects again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialerState {
    Disconnected,
    Connecting,
    Connected,
}

impl Display for ListenerState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        let name = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Connected => "connected",
            Self::Stopped => "stopped",
        };
        formatter.write_str(name)
    }
}

impl Display for DialerState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        formatter.write_str(name)
    }
}
