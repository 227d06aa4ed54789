use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum TransportError {
    /// `send` was called with no active connection. Never retried automatically.
    #[error("Not Connected: {message} {location}")]
    NotConnected {
        message: String,
        location: ErrorLocation,
    },

    /// Connect timed out, was refused, or was cancelled.
    #[error("Connection Unavailable: {message} {location}")]
    ConnectionUnavailable {
        message: String,
        location: ErrorLocation,
    },

    #[error("Send Error: {message} {location}")]
    Send {
        message: String,
        location: ErrorLocation,
    },

    #[error("Read Error: {message} {location}")]
    Read {
        message: String,
        location: ErrorLocation,
    },
}

impl TransportError {
    pub fn is_not_connected(&self) -> bool {
        matches!(self, TransportError::NotConnected { .. })
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, TransportError::ConnectionUnavailable { .. })
    }
}
