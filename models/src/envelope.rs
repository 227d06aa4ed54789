use crate::kind::MessageKind;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// One message exchanged over the bridge channel.
///
/// The timestamp is set by the sender. Everything else lives in [`Payload`],
/// which carries only the fields meaningful for its kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
}

/// Kind-specific envelope content.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Handshake sent by the host when a peer attaches.
    Connected {
        version: String,
        host_version: Option<String>,
    },
    Shutdown,

    CommandStart {
        command: String,
    },
    CommandEnd {
        command: String,
    },
    CommandCancelled {
        command: String,
    },
    CommandFailed {
        command: String,
        error: Option<String>,
    },

    /// A script began evaluating; `first_expression` is its first line.
    ScriptStart {
        first_expression: Option<String>,
    },
    ScriptEnd {
        first_expression: Option<String>,
    },
    ScriptCancelled {
        first_expression: Option<String>,
    },

    PromptString {
        message: Option<String>,
        default_value: Option<String>,
    },
    PromptPoint {
        message: Option<String>,
    },
    PromptSelection {
        message: Option<String>,
    },

    Error {
        message: String,
    },
    Test {
        message: Option<String>,
        drawing: Option<String>,
    },
    SysVar {
        variable: String,
        value: Value,
    },
    SysVarSet {
        variable: String,
        value: Value,
    },
    Pong,

    Execute {
        command: String,
    },
    RunScript {
        expression: String,
    },
    GetVar {
        variable: String,
    },
    SetVar {
        variable: String,
        value: Value,
    },
    Ping,

    /// A kind this build does not know. `fields` holds every wire field except
    /// `type` and `timestamp`, untouched, so it can be forwarded or re-encoded.
    Unknown {
        kind: String,
        fields: Map<String, Value>,
    },
}

impl Payload {
    /// The closed kind for this payload, `None` for [`Payload::Unknown`].
    pub fn kind(&self) -> Option<MessageKind> {
        let kind = match self {
            Self::Connected { .. } => MessageKind::Connected,
            Self::Shutdown => MessageKind::Shutdown,
            Self::CommandStart { .. } => MessageKind::CommandStart,
            Self::CommandEnd { .. } => MessageKind::CommandEnd,
            Self::CommandCancelled { .. } => MessageKind::CommandCancelled,
            Self::CommandFailed { .. } => MessageKind::CommandFailed,
            Self::ScriptStart { .. } => MessageKind::ScriptStart,
            Self::ScriptEnd { .. } => MessageKind::ScriptEnd,
            Self::ScriptCancelled { .. } => MessageKind::ScriptCancelled,
            Self::PromptString { .. } => MessageKind::PromptString,
            Self::PromptPoint { .. } => MessageKind::PromptPoint,
            Self::PromptSelection { .. } => MessageKind::PromptSelection,
            Self::Error { .. } => MessageKind::Error,
            Self::Test { .. } => MessageKind::Test,
            Self::SysVar { .. } => MessageKind::SysVar,
            Self::SysVarSet { .. } => MessageKind::SysVarSet,
            Self::Pong => MessageKind::Pong,
            Self::Execute { .. } => MessageKind::Execute,
            Self::RunScript { .. } => MessageKind::RunScript,
            Self::GetVar { .. } => MessageKind::GetVar,
            Self::SetVar { .. } => MessageKind::SetVar,
            Self::Ping => MessageKind::Ping,
            Self::Unknown { .. } => return None,
        };
        Some(kind)
    }
}

impl Envelope {
    /// Stamp a payload with the current time.
    pub fn new(payload: Payload) -> Self {
        Self::at(payload, Utc::now())
    }

    pub fn at(payload: Payload, timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, payload }
    }

    pub fn kind(&self) -> Option<MessageKind> {
        self.payload.kind()
    }

    /// Wire name of the kind, including the raw name of unknown kinds.
    pub fn kind_name(&self) -> &str {
        match &self.payload {
            Payload::Unknown { kind, .. } => kind,
            other => other.kind().map(|k| k.as_str()).unwrap_or_default(),
        }
    }

    /// Best-effort name of the command or script this envelope is about.
    pub fn identifier(&self) -> Option<&str> {
        match &self.payload {
            Payload::CommandStart { command }
            | Payload::CommandEnd { command }
            | Payload::CommandCancelled { command }
            | Payload::CommandFailed { command, .. } => Some(command),
            Payload::ScriptStart { first_expression }
            | Payload::ScriptEnd { first_expression }
            | Payload::ScriptCancelled { first_expression } => first_expression.as_deref(),
            _ => None,
        }
    }

    pub fn command_start(command: impl Into<String>) -> Self {
        Self::new(Payload::CommandStart {
            command: command.into(),
        })
    }

    pub fn command_end(command: impl Into<String>) -> Self {
        Self::new(Payload::CommandEnd {
            command: command.into(),
        })
    }

    pub fn command_failed(command: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(Payload::CommandFailed {
            command: command.into(),
            error: Some(error.into()),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Payload::Error {
            message: message.into(),
        })
    }
}
