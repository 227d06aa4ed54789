use crate::error::BridgeAppError;

use bridge_core::error::{ConfigError, CoreError, TransportError};

use common::ErrorLocation;

use std::panic::Location;

fn not_connected() -> TransportError {
    TransportError::NotConnected {
        message: "Not connected to 'Bridge'; dropped ping".to_string(),
        location: ErrorLocation::from(Location::caller()),
    }
}

#[test]
fn given_transport_error_when_converted_then_core_variant_keeps_message() {
    let err: BridgeAppError = not_connected().into();

    assert!(matches!(err, BridgeAppError::Core { .. }), "{err:?}");
    assert!(err.to_string().contains("dropped ping"));
}

/// **VALUE**: Verifies a configuration failure wrapped in `CoreError` still reports
/// as a config problem.
///
/// **BUG THIS CATCHES**: Would catch a bad settings file being reported as a
/// transport failure, sending the user looking in the wrong place.
#[test]
fn given_core_config_error_when_converted_then_config_variant() {
    let core = CoreError::from(ConfigError::ValidationError {
        reason: "channel_name cannot be empty".to_string(),
        location: ErrorLocation::from(Location::caller()),
    });

    let err = BridgeAppError::from(core);

    assert!(matches!(err, BridgeAppError::Config { .. }), "{err:?}");
    assert!(err.to_string().contains("channel_name cannot be empty"));
}

#[test]
fn given_app_error_when_displayed_then_location_is_caller() {
    let err = BridgeAppError::app("boom");

    let text = err.to_string();

    assert!(text.starts_with("Command Bridge Error: boom"), "{text}");
    assert!(text.contains("error.rs"), "{text}");
}
