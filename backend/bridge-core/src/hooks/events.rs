use crate::error::hook::HookError;

use tokio::sync::mpsc;

/// A lifecycle notification raised by the host application.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    CommandWillStart {
        command: String,
    },
    CommandEnded {
        command: String,
    },
    CommandCancelled {
        command: String,
    },
    CommandFailed {
        command: String,
        error: Option<String>,
    },
    ScriptWillStart {
        first_line: Option<String>,
    },
    ScriptEnded,
    ScriptCancelled,
    PromptingForString {
        message: Option<String>,
        default_value: Option<String>,
    },
    PromptingForPoint {
        message: Option<String>,
    },
    PromptingForSelection {
        message: Option<String>,
    },
}

/// Where a host event source delivers its events.
///
/// Emitting never blocks, so it is safe to call from the host's own
/// notification callbacks.
#[derive(Debug, Clone)]
pub struct HostEventSink {
    tx: mpsc::UnboundedSender<HostEvent>,
}

impl HostEventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<HostEvent>) -> Self {
        Self { tx }
    }

    /// Returns `false` once the adapter behind this sink has gone away.
    pub fn emit(&self, event: HostEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The host application's event hooks.
///
/// The adapter subscribes when a peer connects and unsubscribes when it
/// leaves, always in pairs.
pub trait HostEventSource: Send + Sync {
    fn subscribe(&self, sink: HostEventSink) -> Result<(), HookError>;

    fn unsubscribe(&self);
}
