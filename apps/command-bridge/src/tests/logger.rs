// Unit tests for logger initialization
// Tests focus on idempotence and error handling

use crate::logger::{LOG_FILE_NAME, console_line, initialize, open_log_file, set_show_timestamps};

use std::path::PathBuf;

/// **VALUE**: Verifies that calling initialize() multiple times doesn't panic or fail.
///
/// **WHY THIS MATTERS**: Every subcommand initializes the logger on startup, and tests
/// may do so again. If the second call errored, fern would refuse to install a second
/// global logger and the process would exit before doing any work.
///
/// **BUG THIS CATCHES**: Would catch if the Once or AtomicBool guards are removed.
#[test]
fn given_logger_initialized_when_called_again_then_returns_ok() {
    // GIVEN: A valid temporary directory
    let temp_dir = tempfile::tempdir().expect("temp dir");

    // WHEN: Calling initialize twice
    let first = initialize(temp_dir.path());
    let second = initialize(temp_dir.path());

    // THEN: Both return Ok (the second logs a warning)
    assert!(first.is_ok(), "First initialization should succeed: {first:?}");
    assert!(second.is_ok(), "Second initialization should be idempotent");
    assert!(temp_dir.path().join(LOG_FILE_NAME).exists());
}

/// **VALUE**: Verifies that an unusable log directory is reported, not panicked on.
///
/// **BUG THIS CATCHES**: Would catch `fern::log_file()` being unwrapped.
#[test]
fn given_invalid_log_dir_when_opening_log_file_then_returns_app_error() {
    // GIVEN: A path under a file, which can never be a directory
    let invalid_dir = PathBuf::from("/dev/null/invalid-path");

    // WHEN
    let result = open_log_file(&invalid_dir);

    // THEN
    let err = result.expect_err("Should return error for invalid log directory");
    let text = format!("{err:?}");
    assert!(text.contains("App"), "Error should be BridgeAppError::App: {text}");
    assert!(err.to_string().contains(LOG_FILE_NAME));
}

/// **VALUE**: Verifies the stdout timestamp setting applies to lines logged after
/// it changes, with the logger already running.
///
/// **WHY THIS MATTERS**: The logger starts before settings are read so that
/// settings loading can log. `show_timestamps` is only known afterwards.
///
/// **BUG THIS CATCHES**: Would catch the format capturing the setting once at
/// install time, which forces either losing the settings log lines or ignoring
/// `show_timestamps`.
#[test]
fn given_timestamps_toggled_when_formatting_console_line_then_date_follows_setting() {
    // GIVEN / WHEN
    set_show_timestamps(false);
    let plain = console_line("INFO", "Settings loaded");
    set_show_timestamps(true);
    let stamped = console_line("INFO", "Settings loaded");

    // THEN
    assert_eq!(plain, "[INFO] Settings loaded");
    assert!(stamped.starts_with('['), "{stamped}");
    assert!(stamped.ends_with(" - INFO] Settings loaded"), "{stamped}");
    assert!(stamped.len() > plain.len(), "{stamped}");
}
