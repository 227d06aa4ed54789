use bridge_core::error::{ConfigError, CoreError, TransportError};

use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error;

/// Errors surfaced by the command-bridge binary.
///
/// Library errors keep their own location; the conversions below add the
/// point where the binary received them.
#[derive(Debug, Error)]
pub enum BridgeAppError {
    /// Error from this App
    #[error("Command Bridge Error: {message} {location}")]
    App {
        message: String,
        location: ErrorLocation,
    },

    /// Error from bridge-core operations (transport, hooks, codec)
    #[error("Core Error: {message} {location}")]
    Core {
        message: String,
        location: ErrorLocation,
    },

    /// Settings could not be loaded, validated, or overridden
    #[error("Config Error: {message} {location}")]
    Config {
        message: String,
        location: ErrorLocation,
    },
}

impl BridgeAppError {
    #[track_caller]
    pub fn app(message: impl Into<String>) -> Self {
        BridgeAppError::App {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<CoreError> for BridgeAppError {
    #[track_caller]
    fn from(error: CoreError) -> Self {
        let location = ErrorLocation::from(Location::caller());
        match error {
            CoreError::Config(config) => BridgeAppError::Config {
                message: config.to_string(),
                location,
            },
            other => BridgeAppError::Core {
                message: other.to_string(),
                location,
            },
        }
    }
}

impl From<TransportError> for BridgeAppError {
    #[track_caller]
    fn from(error: TransportError) -> Self {
        BridgeAppError::Core {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<ConfigError> for BridgeAppError {
    #[track_caller]
    fn from(error: ConfigError) -> Self {
        BridgeAppError::Config {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
