use command_bridge::cli::{Cli, Command};
use command_bridge::commands::{self, monitor::describe, resolve_settings};
use command_bridge::error::BridgeAppError;
use command_bridge::logger::{initialize as LoggerInitialize, set_show_timestamps};

use bridge_core::BRIDGE_IDENT;

use models::Payload;

use std::fs::create_dir_all;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

const APP_DIR_NAME: &str = "command-bridge";

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, BridgeAppError> {
    let log_dir = log_dir()?;
    create_dir_all(&log_dir).map_err(|e| {
        BridgeAppError::app(format!(
            "Failed to create log directory {}: {e}",
            log_dir.display()
        ))
    })?;

    // Initialize logger FIRST
    LoggerInitialize(&log_dir)?;

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or_else(|| BridgeAppError::app("Could not determine config directory"))?,
    };
    let settings = resolve_settings(&config_dir, cli.channel.as_deref())?;
    set_show_timestamps(settings.show_timestamps);

    info!("{BRIDGE_IDENT} starting on channel '{}'", settings.channel_name);
    info!("Log directory: {}", log_dir.display());

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupted; shutting down");
                    cancel.cancel();
                }
                Err(e) => warn!("Ctrl-C handler unavailable: {e}"),
            }
        }
    });

    match cli.command {
        Command::HostSim {
            interval_ms,
            host_version,
        } => {
            commands::host_sim::run(
                &settings,
                Duration::from_millis(interval_ms),
                host_version,
                &cancel,
            )
            .await?
        }
        Command::Monitor { export } => commands::monitor::run(&settings, export, &cancel).await?,
        Command::Send { request } => {
            let reply = commands::send::run(&settings, &request, &cancel).await?;
            println!("{}", describe(&reply));
            if matches!(reply.payload, Payload::Error { .. }) {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn log_dir() -> Result<PathBuf, BridgeAppError> {
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join("logs"))
        .ok_or_else(|| BridgeAppError::app("Could not determine local data directory"))
}
