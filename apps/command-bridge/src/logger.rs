//! Console and file logging for the command-bridge binary.
//!
//! Colored stdout plus a plain log file, installed once per process.

use crate::error::BridgeAppError;

use common::ErrorLocation;

use std::fmt::Display;
use std::fs::File;
use std::io::stdout;
use std::path::Path;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use fern::Dispatch;
use fern::colors::Color::{Blue, Green, Magenta, Red, Yellow};
use fern::colors::ColoredLevelConfig;
use humantime::format_rfc3339_millis;
use log::{LevelFilter, info, warn};

static INIT_LOGGER_ONCE: Once = Once::new();

static LOGGER_ALREADY_CALLED: AtomicBool = AtomicBool::new(false);

/// Read per line, so settings loaded after the logger is up still apply.
static SHOW_TIMESTAMPS: AtomicBool = AtomicBool::new(true);

pub const LOG_FILE_NAME: &str = "command-bridge.log";

const LOGGER_INITIALIZED_MESSAGE_PREFIX: &str = "Logger initialized with level: ";

const LOGGER_ALREADY_INITIALIZED_MESSAGE: &str = "Logger already initialized";

#[cfg(debug_assertions)]
const LOG_LEVEL: LevelFilter = LevelFilter::Debug;

#[cfg(not(debug_assertions))]
const LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Initialize the logger with dual output (stdout + `command-bridge.log`).
///
/// Safe to call more than once: later calls log a warning and return `Ok`.
/// Stdout carries timestamps until [`set_show_timestamps`] says otherwise;
/// the file always carries them.
///
/// # Errors
///
/// Returns [`BridgeAppError::App`] if the log file cannot be created or a
/// global logger is already installed by someone else.
pub fn initialize(log_dir: &Path) -> Result<(), BridgeAppError> {
    if LOGGER_ALREADY_CALLED.swap(true, Ordering::SeqCst) {
        warn!("{LOGGER_ALREADY_INITIALIZED_MESSAGE}");
        return Ok(());
    }

    let mut result = Ok(());

    INIT_LOGGER_ONCE.call_once(|| {
        result = initialize_internal(log_dir);
        if result.is_ok() {
            info!("{LOGGER_INITIALIZED_MESSAGE_PREFIX}{LOG_LEVEL:?}");
        }
    });

    result
}

/// Toggle timestamps on stdout lines.
pub fn set_show_timestamps(enabled: bool) {
    SHOW_TIMESTAMPS.store(enabled, Ordering::Relaxed);
}

/// One stdout line.
pub(crate) fn console_line(level: impl Display, message: impl Display) -> String {
    if SHOW_TIMESTAMPS.load(Ordering::Relaxed) {
        format!(
            "[{date} - {level}] {message}",
            date = format_rfc3339_millis(SystemTime::now()),
        )
    } else {
        format!("[{level}] {message}")
    }
}

#[track_caller]
fn initialize_internal(log_dir: &Path) -> Result<(), BridgeAppError> {
    let color_configuration = ColoredLevelConfig::new()
        .debug(Blue)
        .info(Green)
        .warn(Yellow)
        .error(Red)
        .trace(Magenta);

    let base_dispatch = Dispatch::new().level(LOG_LEVEL);

    let stdout_dispatch = Dispatch::new()
        .format(move |out, message, record| {
            let level = color_configuration.color(record.level());
            out.finish(format_args!("{}", console_line(level, message)))
        })
        .chain(stdout());

    // Plain text, no colors
    let file_dispatch = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{date} - {level}] {message} [{file}:{line}]",
                date = format_rfc3339_millis(SystemTime::now()),
                level = record.level(),
                message = message,
                file = record.file().unwrap_or("unknown"),
                line = record.line().unwrap_or(0)
            ))
        })
        .chain(open_log_file(log_dir)?);

    base_dispatch
        .chain(stdout_dispatch)
        .chain(file_dispatch)
        .apply()
        .map_err(|e| BridgeAppError::App {
            message: format!("Failed to initialize logger: {e}"),
            location: ErrorLocation::from(std::panic::Location::caller()),
        })?;

    Ok(())
}

/// Open (or create) the log file in append mode.
#[track_caller]
pub(crate) fn open_log_file(log_dir: &Path) -> Result<File, BridgeAppError> {
    let log_file_path = log_dir.join(LOG_FILE_NAME);
    fern::log_file(&log_file_path).map_err(|e| BridgeAppError::App {
        message: format!("Failed to create log file {}: {e}", log_file_path.display()),
        location: ErrorLocation::from(std::panic::Location::caller()),
    })
}
