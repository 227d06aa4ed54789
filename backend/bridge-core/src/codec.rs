//! Line codec for bridge envelopes.
//!
//! Each record is one JSON object on one line. On the wire an envelope is a
//! flat object: a `type` discriminator, a `timestamp`, and whichever optional
//! fields the kind uses. [`WireEnvelope`] is that flat shape; [`encode`] and
//! [`decode`] map it to and from the typed [`Envelope`].
//!
//! Decoding never panics and never aborts a read loop: a bad record yields
//! [`CodecError::Malformed`] and an unrecognized `type` yields
//! [`Payload::Unknown`] with the raw fields preserved.

use crate::error::codec::CodecError;

use common::ErrorLocation;
use models::{Envelope, MessageKind, Payload};

use std::panic::Location;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

const TYPE_FIELD: &str = "type";
const TIMESTAMP_FIELD: &str = "timestamp";
const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Flat wire shape of an envelope.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: String,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_timestamp"
    )]
    timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    variable: Option<String>,

    /// `Some(Value::Null)` means the field was present and null.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    drawing: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,

    // Written with the legacy peers' spellings; snake_case is read too.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "autocadVersion",
        alias = "host_version",
        alias = "autocad_version"
    )]
    host_version: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "firstExpression",
        alias = "first_expression"
    )]
    first_expression: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "defaultValue",
        alias = "default_value"
    )]
    default_value: Option<String>,
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Accepts RFC 3339 with any offset, or an offset-less local-style stamp
/// which is taken as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }

    NaiveDateTime::parse_from_str(&raw, NAIVE_TIMESTAMP_FORMAT)
        .map(|naive| Some(naive.and_utc()))
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
}

/// Encode an envelope as a single line of JSON, without the trailing newline.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] only if serialization itself fails.
pub fn encode(envelope: &Envelope) -> Result<String, CodecError> {
    let value = match &envelope.payload {
        Payload::Unknown { kind, fields } => {
            let mut object = fields.clone();
            object.insert(TYPE_FIELD.to_string(), Value::String(kind.clone()));
            object.insert(
                TIMESTAMP_FIELD.to_string(),
                serde_json::to_value(envelope.timestamp)?,
            );
            Value::Object(object)
        }
        _ => serde_json::to_value(to_wire(envelope))?,
    };

    // serde_json escapes control characters, so the output never spans lines.
    Ok(serde_json::to_string(&value)?)
}

/// Encode an envelope followed by `\n`, ready to be written as one record.
pub fn encode_line(envelope: &Envelope) -> Result<String, CodecError> {
    let mut line = encode(envelope)?;
    line.push('\n');
    Ok(line)
}

/// Decode one record. Surrounding whitespace, including a trailing `\r`, is ignored.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if the record is not a JSON object, has no
/// string `type`, or is a known kind missing one of its required fields.
pub fn decode(line: &str) -> Result<Envelope, CodecError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(CodecError::malformed("empty record"));
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| CodecError::malformed(format!("invalid JSON: {e}")))?;

    let Value::Object(object) = value else {
        return Err(CodecError::malformed("record is not a JSON object"));
    };

    let kind_name = match object.get(TYPE_FIELD) {
        Some(Value::String(name)) => name.clone(),
        Some(_) => return Err(CodecError::malformed("`type` is not a string")),
        None => return Err(CodecError::malformed("missing `type`")),
    };

    let Some(kind) = MessageKind::parse(&kind_name) else {
        return decode_unknown(kind_name, object);
    };

    let wire: WireEnvelope = serde_json::from_value(Value::Object(object))
        .map_err(|e| CodecError::malformed(format!("invalid {kind_name} record: {e}")))?;

    let timestamp = wire.timestamp.unwrap_or_else(Utc::now);
    let payload = from_wire(kind, wire)?;

    Ok(Envelope::at(payload, timestamp))
}

fn decode_unknown(kind: String, mut fields: Map<String, Value>) -> Result<Envelope, CodecError> {
    fields.remove(TYPE_FIELD);

    let timestamp = match fields.remove(TIMESTAMP_FIELD) {
        Some(raw) => deserialize_timestamp(raw)
            .map_err(|e| CodecError::malformed(format!("invalid {kind} record: {e}")))?
            .unwrap_or_else(Utc::now),
        None => Utc::now(),
    };

    Ok(Envelope::at(Payload::Unknown { kind, fields }, timestamp))
}

fn to_wire(envelope: &Envelope) -> WireEnvelope {
    let mut wire = WireEnvelope {
        kind: envelope.kind_name().to_string(),
        timestamp: Some(envelope.timestamp),
        ..Default::default()
    };

    match envelope.payload.clone() {
        Payload::Connected {
            version,
            host_version,
        } => {
            wire.version = Some(version);
            wire.host_version = host_version;
        }
        Payload::Shutdown | Payload::Pong | Payload::Ping => {}
        Payload::CommandStart { command }
        | Payload::CommandEnd { command }
        | Payload::CommandCancelled { command }
        | Payload::Execute { command } => wire.command = Some(command),
        Payload::CommandFailed { command, error } => {
            wire.command = Some(command);
            wire.error = error;
        }
        Payload::ScriptStart { first_expression }
        | Payload::ScriptEnd { first_expression }
        | Payload::ScriptCancelled { first_expression } => {
            wire.first_expression = first_expression
        }
        Payload::PromptString {
            message,
            default_value,
        } => {
            wire.message = message;
            wire.default_value = default_value;
        }
        Payload::PromptPoint { message } | Payload::PromptSelection { message } => {
            wire.message = message
        }
        Payload::Error { message } => wire.message = Some(message),
        Payload::Test { message, drawing } => {
            wire.message = message;
            wire.drawing = drawing;
        }
        Payload::SysVar { variable, value }
        | Payload::SysVarSet { variable, value }
        | Payload::SetVar { variable, value } => {
            wire.variable = Some(variable);
            wire.value = Some(value);
        }
        Payload::RunScript { expression } => wire.message = Some(expression),
        Payload::GetVar { variable } => wire.variable = Some(variable),
        Payload::Unknown { .. } => {}
    }

    wire
}

fn from_wire(kind: MessageKind, wire: WireEnvelope) -> Result<Payload, CodecError> {
    let payload = match kind {
        MessageKind::Connected => Payload::Connected {
            version: required(kind, "version", wire.version)?,
            host_version: wire.host_version,
        },
        MessageKind::Shutdown => Payload::Shutdown,
        MessageKind::CommandStart => Payload::CommandStart {
            command: required(kind, "command", wire.command)?,
        },
        MessageKind::CommandEnd => Payload::CommandEnd {
            command: required(kind, "command", wire.command)?,
        },
        MessageKind::CommandCancelled => Payload::CommandCancelled {
            command: required(kind, "command", wire.command)?,
        },
        MessageKind::CommandFailed => Payload::CommandFailed {
            command: required(kind, "command", wire.command)?,
            error: wire.error,
        },
        MessageKind::ScriptStart => Payload::ScriptStart {
            first_expression: wire.first_expression,
        },
        MessageKind::ScriptEnd => Payload::ScriptEnd {
            first_expression: wire.first_expression,
        },
        MessageKind::ScriptCancelled => Payload::ScriptCancelled {
            first_expression: wire.first_expression,
        },
        MessageKind::PromptString => Payload::PromptString {
            message: wire.message,
            default_value: wire.default_value,
        },
        MessageKind::PromptPoint => Payload::PromptPoint {
            message: wire.message,
        },
        MessageKind::PromptSelection => Payload::PromptSelection {
            message: wire.message,
        },
        MessageKind::Error => Payload::Error {
            message: required(kind, "message", wire.message)?,
        },
        MessageKind::Test => Payload::Test {
            message: wire.message,
            drawing: wire.drawing,
        },
        MessageKind::SysVar => Payload::SysVar {
            variable: required(kind, "variable", wire.variable)?,
            value: required(kind, "value", wire.value)?,
        },
        MessageKind::SysVarSet => Payload::SysVarSet {
            variable: required(kind, "variable", wire.variable)?,
            value: required(kind, "value", wire.value)?,
        },
        MessageKind::Pong => Payload::Pong,
        MessageKind::Execute => Payload::Execute {
            command: required(kind, "command", wire.command)?,
        },
        MessageKind::RunScript => Payload::RunScript {
            expression: required(kind, "message", wire.message)?,
        },
        MessageKind::GetVar => Payload::GetVar {
            variable: required(kind, "variable", wire.variable)?,
        },
        MessageKind::SetVar => Payload::SetVar {
            variable: required(kind, "variable", wire.variable)?,
            value: required(kind, "value", wire.value)?,
        },
        MessageKind::Ping => Payload::Ping,
    };

    Ok(payload)
}

#[track_caller]
fn required<T>(kind: MessageKind, field: &str, value: Option<T>) -> Result<T, CodecError> {
    value.ok_or_else(|| CodecError::Malformed {
        message: format!("{kind} record is missing `{field}`"),
        location: ErrorLocation::from(Location::caller()),
    })
}
