use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum CodecError {
    /// The record is not a valid envelope. Readers skip it and keep going.
    #[error("Malformed Message: {message} {location}")]
    Malformed {
        message: String,
        location: ErrorLocation,
    },

    #[error("Encode Error: {message} {location}")]
    Encode {
        message: String,
        location: ErrorLocation,
    },
}

impl CodecError {
    #[track_caller]
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        CodecError::Malformed {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, CodecError::Malformed { .. })
    }

    /// Message without the location suffix, suitable for an envelope.
    pub fn reason(&self) -> &str {
        match self {
            CodecError::Malformed { message, .. } | CodecError::Encode { message, .. } => message,
        }
    }
}

impl From<serde_json::Error> for CodecError {
    #[track_caller]
    fn from(error: serde_json::Error) -> Self {
        CodecError::Encode {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
