use crate::config::{
    BridgeSettings, DEFAULT_CHANNEL_NAME, ENV_CHANNEL_NAME, ENV_CONNECTION_TIMEOUT_MS,
    ENV_MAX_HISTORY_ITEMS,
};
use crate::error::ConfigError;

use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

fn clear_overrides() {
    // SAFETY: env-mutating tests are serialized with #[serial].
    unsafe {
        std::env::remove_var(ENV_CHANNEL_NAME);
        std::env::remove_var(ENV_CONNECTION_TIMEOUT_MS);
        std::env::remove_var(ENV_MAX_HISTORY_ITEMS);
    }
}

#[test]
fn given_defaults_then_match_documented_values() {
    let settings = BridgeSettings::default();

    assert_eq!(settings.channel_name, DEFAULT_CHANNEL_NAME);
    assert!(settings.auto_connect);
    assert!(settings.show_timestamps);
    assert!(settings.highlight_errors);
    assert_eq!(settings.connection_timeout(), Duration::from_secs(10));
    assert_eq!(settings.max_history_items, 1000);
    assert_eq!(settings.reconnect_backoff(), Duration::from_secs(2));
    assert_eq!(settings.connect_attempts, 3);
}

#[test]
fn given_missing_file_when_load_then_defaults() {
    let dir = TempDir::new().expect("temp dir");

    let settings = BridgeSettings::load(dir.path()).expect("missing file is not an error");

    assert_eq!(settings, BridgeSettings::default());
}

#[test]
fn given_saved_settings_when_loaded_then_equal() {
    let dir = TempDir::new().expect("temp dir");
    let settings = BridgeSettings {
        channel_name: "DraftingBridge".to_string(),
        show_timestamps: false,
        max_history_items: 50,
        ..BridgeSettings::default()
    };

    settings.save(dir.path()).expect("save");
    let loaded = BridgeSettings::load(dir.path()).expect("load");

    assert_eq!(loaded, settings);
    assert!(!dir.path().join("bridge.json.tmp").exists());
}

/// **VALUE**: Verifies a partial file fills the rest from defaults.
///
/// **BUG THIS CATCHES**: Would catch a field missing its serde default, which makes
/// every older settings file fail to parse after an upgrade.
#[test]
fn given_partial_file_when_loaded_then_missing_fields_defaulted() {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(
        dir.path().join("bridge.json"),
        r#"{ "channel_name": "Partial", "connection_timeout_ms": 2500 }"#,
    )
    .expect("write");

    let loaded = BridgeSettings::load(dir.path()).expect("load");

    assert_eq!(loaded.channel_name, "Partial");
    assert_eq!(loaded.connection_timeout_ms, 2500);
    assert_eq!(loaded.max_history_items, 1000);
    assert_eq!(loaded.connect_attempts, 3);
}

#[test]
fn given_invalid_json_when_loaded_then_parse_error() {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("bridge.json"), "{ not json").expect("write");

    let error = BridgeSettings::load(dir.path()).expect_err("invalid JSON");

    assert!(matches!(error, ConfigError::ParseError { .. }), "{error}");
}

#[test]
fn given_invalid_values_when_validated_then_rejected() {
    let cases = [
        BridgeSettings {
            channel_name: "  ".to_string(),
            ..BridgeSettings::default()
        },
        BridgeSettings {
            channel_name: "nested/name".to_string(),
            ..BridgeSettings::default()
        },
        BridgeSettings {
            connection_timeout_ms: 0,
            ..BridgeSettings::default()
        },
        BridgeSettings {
            max_history_items: 0,
            ..BridgeSettings::default()
        },
        BridgeSettings {
            connect_attempts: 0,
            ..BridgeSettings::default()
        },
    ];

    for settings in cases {
        let error = settings.validate().expect_err("invalid settings");
        assert!(matches!(error, ConfigError::ValidationError { .. }), "{error}");
    }
}

#[test]
fn given_invalid_settings_when_saved_then_nothing_written() {
    let dir = TempDir::new().expect("temp dir");
    let settings = BridgeSettings {
        max_history_items: 0,
        ..BridgeSettings::default()
    };

    assert!(settings.save(dir.path()).is_err());
    assert!(!dir.path().join("bridge.json").exists());
}

#[test]
#[serial]
fn given_env_overrides_when_applied_then_fields_replaced() {
    clear_overrides();
    // SAFETY: serialized with #[serial].
    unsafe {
        std::env::set_var(ENV_CHANNEL_NAME, "EnvBridge");
        std::env::set_var(ENV_CONNECTION_TIMEOUT_MS, " 1500 ");
        std::env::set_var(ENV_MAX_HISTORY_ITEMS, "20");
    }

    let mut settings = BridgeSettings::default();
    let result = settings.apply_env_overrides();
    clear_overrides();

    result.expect("overrides apply");
    assert_eq!(settings.channel_name, "EnvBridge");
    assert_eq!(settings.connection_timeout_ms, 1500);
    assert_eq!(settings.max_history_items, 20);
}

#[test]
#[serial]
fn given_unparseable_override_when_applied_then_env_error_names_variable() {
    clear_overrides();
    // SAFETY: serialized with #[serial].
    unsafe {
        std::env::set_var(ENV_CONNECTION_TIMEOUT_MS, "ten seconds");
    }

    let mut settings = BridgeSettings::default();
    let result = settings.apply_env_overrides();
    clear_overrides();

    match result {
        Err(ConfigError::EnvOverride { variable, .. }) => {
            assert_eq!(variable, ENV_CONNECTION_TIMEOUT_MS)
        }
        other => panic!("expected EnvOverride, got {other:?}"),
    }
}

#[test]
#[serial]
fn given_zero_override_when_applied_then_validation_error() {
    clear_overrides();
    // SAFETY: serialized with #[serial].
    unsafe {
        std::env::set_var(ENV_MAX_HISTORY_ITEMS, "0");
    }

    let mut settings = BridgeSettings::default();
    let result = settings.apply_env_overrides();
    clear_overrides();

    assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
}
