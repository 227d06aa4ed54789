use std::fmt::{Display, Formatter, Result as FormatResult};

use serde::de::IntoDeserializer;
use serde::de::value::{Error as ValueError, StrDeserializer};
use serde::{Deserialize, Serialize};

/// Closed set of envelope kinds understood by this version of the bridge.
///
/// The serde names are the wire names. Script kinds keep the legacy `lisp_*`
/// spelling on output and accept `script_*` on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Connected,
    Shutdown,
    CommandStart,
    CommandEnd,
    CommandCancelled,
    CommandFailed,
    #[serde(rename = "lisp_start", alias = "script_start")]
    ScriptStart,
    #[serde(rename = "lisp_end", alias = "script_end")]
    ScriptEnd,
    #[serde(rename = "lisp_cancelled", alias = "script_cancelled")]
    ScriptCancelled,
    PromptString,
    PromptPoint,
    PromptSelection,
    Error,
    Test,
    #[serde(rename = "sysvar")]
    SysVar,
    #[serde(rename = "sysvar_set")]
    SysVarSet,
    Pong,
    Execute,
    #[serde(rename = "lisp", alias = "run_script")]
    RunScript,
    #[serde(rename = "getvar")]
    GetVar,
    #[serde(rename = "setvar")]
    SetVar,
    Ping,
}

impl MessageKind {
    /// Resolve a wire name (including aliases). Unrecognized names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let deserializer: StrDeserializer<'_, ValueError> = name.into_deserializer();
        Self::deserialize(deserializer).ok()
    }

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Shutdown => "shutdown",
            Self::CommandStart => "command_start",
            Self::CommandEnd => "command_end",
            Self::CommandCancelled => "command_cancelled",
            Self::CommandFailed => "command_failed",
            Self::ScriptStart => "lisp_start",
            Self::ScriptEnd => "lisp_end",
            Self::ScriptCancelled => "lisp_cancelled",
            Self::PromptString => "prompt_string",
            Self::PromptPoint => "prompt_point",
            Self::PromptSelection => "prompt_selection",
            Self::Error => "error",
            Self::Test => "test",
            Self::SysVar => "sysvar",
            Self::SysVarSet => "sysvar_set",
            Self::Pong => "pong",
            Self::Execute => "execute",
            Self::RunScript => "lisp",
            Self::GetVar => "getvar",
            Self::SetVar => "setvar",
            Self::Ping => "ping",
        }
    }

    /// Kinds the external side sends to the host.
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Self::Execute | Self::RunScript | Self::GetVar | Self::SetVar | Self::Ping
        )
    }
}

impl Display for MessageKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        formatter.write_str(self.as_str())
    }
}
