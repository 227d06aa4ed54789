pub mod host_sim;
pub mod monitor;
pub mod send;

use crate::error::BridgeAppError;

use bridge_core::config::BridgeSettings;

use std::path::Path;

use log::info;

/// Settings from `{config_dir}/bridge.json`, then the environment, then the
/// `--channel` flag, validated after every layer.
pub fn resolve_settings(
    config_dir: &Path,
    channel_override: Option<&str>,
) -> Result<BridgeSettings, BridgeAppError> {
    let mut settings = BridgeSettings::load(config_dir)?;
    settings.apply_env_overrides()?;

    if let Some(channel) = channel_override {
        info!("Channel name overridden on the command line: {channel}");
        settings.channel_name = channel.to_string();
        settings.validate()?;
    }

    Ok(settings)
}
