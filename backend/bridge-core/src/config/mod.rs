use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::env::var as env_var;
use std::panic::Location;
use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

const SETTINGS_FILE_NAME: &str = "bridge.json";

pub const DEFAULT_CHANNEL_NAME: &str = "AutoCADCommandBridge";
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_HISTORY_ITEMS: usize = 1_000;
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 2_000;
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;

pub const ENV_CHANNEL_NAME: &str = "COMMAND_BRIDGE_CHANNEL";
pub const ENV_CONNECTION_TIMEOUT_MS: &str = "COMMAND_BRIDGE_TIMEOUT_MS";
pub const ENV_MAX_HISTORY_ITEMS: &str = "COMMAND_BRIDGE_MAX_HISTORY";

// ============================================
// SETTINGS
// ============================================

/// Runtime options shared by the host and external sides of the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSettings {
    #[serde(default = "default_channel_name")]
    pub channel_name: String,

    #[serde(default = "default_true")]
    pub auto_connect: bool,

    /// Presentation only.
    #[serde(default = "default_true")]
    pub show_timestamps: bool,

    /// Presentation only.
    #[serde(default = "default_true")]
    pub highlight_errors: bool,

    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    #[serde(default = "default_max_history_items")]
    pub max_history_items: usize,

    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            channel_name: default_channel_name(),
            auto_connect: default_true(),
            show_timestamps: default_true(),
            highlight_errors: default_true(),
            connection_timeout_ms: default_connection_timeout_ms(),
            max_history_items: default_max_history_items(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            connect_attempts: default_connect_attempts(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_channel_name() -> String {
    DEFAULT_CHANNEL_NAME.to_string()
}
fn default_true() -> bool {
    true
}
fn default_connection_timeout_ms() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_MS
}
fn default_max_history_items() -> usize {
    DEFAULT_MAX_HISTORY_ITEMS
}
fn default_reconnect_backoff_ms() -> u64 {
    DEFAULT_RECONNECT_BACKOFF_MS
}
fn default_connect_attempts() -> u32 {
    DEFAULT_CONNECT_ATTEMPTS
}

// ============================================
// IMPLEMENTATION
// ============================================

impl BridgeSettings {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    /// Load settings from {settings_dir}/bridge.json.
    ///
    /// # Returns
    ///
    /// Returns defaults if the file does not exist.
    /// Returns `Err(ConfigError)` if the file exists but is unreadable or invalid.
    pub fn load(settings_dir: &Path) -> Result<Self, ConfigError> {
        let settings_path = settings_dir.join(SETTINGS_FILE_NAME);

        if !settings_path.exists() {
            info!(
                "Settings file not found at {}, using defaults",
                settings_path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&settings_path).map_err(|e| {
            warn!("Failed to read settings file: {}", e);
            ConfigError::ReadError {
                location: ErrorLocation::from(Location::caller()),
                path: settings_path.clone(),
                source: e,
            }
        })?;

        let settings: BridgeSettings = serde_json::from_str(&contents).map_err(|e| {
            warn!("Failed to parse settings JSON: {}", e);
            ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: settings_path.clone(),
                reason: e.to_string(),
            }
        })?;

        settings.validate()?;

        info!("Settings loaded from {}", settings_path.display());
        Ok(settings)
    }

    /// Save settings to {settings_dir}/bridge.json using temp file + rename.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if validation, directory creation, serialization,
    /// write, or rename fails.
    pub fn save(&self, settings_dir: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        std::fs::create_dir_all(settings_dir).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: settings_dir.to_path_buf(),
            source: e,
        })?;

        let settings_path = settings_dir.join(SETTINGS_FILE_NAME);
        let temp_path = settings_dir.join(format!("{}.tmp", SETTINGS_FILE_NAME));

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        std::fs::write(&temp_path, json).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, &settings_path).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: settings_path.clone(),
            source: e,
        })?;

        info!("Settings saved to {}", settings_path.display());
        Ok(())
    }

    /// Validate settings values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_name.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "channel_name cannot be empty".to_string(),
            });
        }

        // The name becomes the last component of a pipe or socket path.
        if self.channel_name.contains(['/', '\\']) {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "channel_name must not contain path separators: {}",
                    self.channel_name
                ),
            });
        }

        if self.connection_timeout_ms == 0 {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "connection_timeout_ms must be greater than 0".to_string(),
            });
        }

        if self.max_history_items == 0 {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "max_history_items must be greater than 0".to_string(),
            });
        }

        if self.connect_attempts == 0 {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "connect_attempts must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Apply overrides from the process environment, after loading a `.env`
    /// file from the working directory or its parents if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EnvOverride`] for an unparseable numeric override, or
    /// [`ConfigError::ValidationError`] if the result is invalid.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }

        if let Ok(name) = env_var(ENV_CHANNEL_NAME) {
            info!("Channel name overridden by {ENV_CHANNEL_NAME}: {name}");
            self.channel_name = name;
        }

        if let Ok(raw) = env_var(ENV_CONNECTION_TIMEOUT_MS) {
            self.connection_timeout_ms = parse_override(ENV_CONNECTION_TIMEOUT_MS, &raw)?;
        }

        if let Ok(raw) = env_var(ENV_MAX_HISTORY_ITEMS) {
            self.max_history_items = parse_override(ENV_MAX_HISTORY_ITEMS, &raw)?;
        }

        self.validate()
    }
}

#[track_caller]
fn parse_override<T: std::str::FromStr>(variable: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::EnvOverride {
        location: ErrorLocation::from(Location::caller()),
        variable: variable.to_string(),
        reason: format!("{raw:?}: {e}"),
    })
}
