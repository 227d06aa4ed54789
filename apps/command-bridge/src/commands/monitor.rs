use crate::error::BridgeAppError;

use bridge_core::config::BridgeSettings;
use bridge_core::monitor::{BridgeMonitor, LinkStatus};
use bridge_core::stats::engine::DEFAULT_FAILURE_TEXT;
use bridge_core::transport::DialerState;

use models::{Envelope, Payload, SessionStatistics};

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// How often the monitor pings the host and reports link status.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Connect, log every envelope, and keep statistics until `cancel` fires or
/// the host goes away for good. Writes the session report to `export` on exit.
pub async fn run(
    settings: &BridgeSettings,
    export: Option<PathBuf>,
    cancel: &CancellationToken,
) -> Result<(), BridgeAppError> {
    let monitor = BridgeMonitor::start(settings, cancel);
    let mut envelopes = monitor.subscribe_envelopes();
    let mut state = monitor.dialer().subscribe_state();

    let connected = if settings.auto_connect {
        monitor.connect().await
    } else {
        monitor.dialer().connect().await
    };
    if let Err(e) = connected {
        monitor.shutdown().await;
        return Err(e.into());
    }
    state.borrow_and_update();

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            received = envelopes.recv() => match received {
                Ok(envelope) => log_envelope(&envelope, settings.highlight_errors),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Monitor fell behind; {skipped} envelopes not logged");
                }
                Err(RecvError::Closed) => break,
            },

            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                if *state.borrow_and_update() != DialerState::Disconnected {
                    continue;
                }

                log_summary(&monitor.statistics().statistics().await);
                if !settings.auto_connect {
                    info!("Host disconnected; exiting");
                    break;
                }

                info!("Host disconnected; reconnecting");
                if let Err(e) = monitor.connect().await {
                    if !cancel.is_cancelled() {
                        error!("{e}");
                    }
                    break;
                }
                state.borrow_and_update();
            }

            _ = heartbeat.tick() => {
                if let Err(e) = monitor.dialer().ping().await {
                    debug!("Heartbeat ping skipped: {e}");
                }
                match monitor.link_status().await {
                    LinkStatus::PeerSilent { since } => {
                        warn!("Host has been silent since {since}");
                    }
                    status => debug!("Link status: {status:?}"),
                }
            }
        }
    }

    log_summary(&monitor.statistics().statistics().await);

    let written = match export {
        Some(path) => write_export(&monitor, &path).await,
        None => Ok(()),
    };

    monitor.shutdown().await;
    written
}

async fn write_export(monitor: &BridgeMonitor, path: &Path) -> Result<(), BridgeAppError> {
    let export = monitor.statistics().export().await;
    let json = export
        .to_json_pretty()
        .map_err(|e| BridgeAppError::app(format!("Failed to serialize session report: {e}")))?;

    std::fs::write(path, json).map_err(|e| {
        BridgeAppError::app(format!(
            "Failed to write session report to {}: {e}",
            path.display()
        ))
    })?;

    info!(
        "Session report ({} commands) written to {}",
        export.command_count,
        path.display()
    );
    Ok(())
}

fn log_summary(statistics: &SessionStatistics) {
    info!(
        "Session: {} commands, {} errors ({:.1}%), avg {:.0} ms, {:.1} commands/min",
        statistics.command_count,
        statistics.error_count,
        statistics.error_rate,
        statistics.average_duration_ms,
        statistics.commands_per_minute
    );
}

fn log_envelope(envelope: &Envelope, highlight_errors: bool) {
    let line = describe(envelope);
    match envelope.payload {
        Payload::Error { .. } | Payload::CommandFailed { .. } if highlight_errors => {
            error!("{line}")
        }
        Payload::Error { .. } | Payload::CommandFailed { .. } => warn!("{line}"),
        Payload::Unknown { .. } => debug!("{line}"),
        _ => info!("{line}"),
    }
}

/// One human-readable line for an envelope.
pub fn describe(envelope: &Envelope) -> String {
    fn or_blank(text: &Option<String>) -> &str {
        text.as_deref().unwrap_or("")
    }

    match &envelope.payload {
        Payload::Connected {
            version,
            host_version,
        } => format!(
            "Connected to {} (bridge {version})",
            host_version.as_deref().unwrap_or("host")
        ),
        Payload::Shutdown => "Host bridge shutting down".to_string(),
        Payload::CommandStart { command } => format!("Command started: {command}"),
        Payload::CommandEnd { command } => format!("Command completed: {command}"),
        Payload::CommandCancelled { command } => format!("Command cancelled: {command}"),
        Payload::CommandFailed { command, error } => format!(
            "Command failed: {command} ({})",
            error.as_deref().unwrap_or(DEFAULT_FAILURE_TEXT)
        ),
        Payload::ScriptStart { first_expression } => {
            format!("Script started: {}", or_blank(first_expression))
        }
        Payload::ScriptEnd { first_expression } => {
            format!("Script completed: {}", or_blank(first_expression))
        }
        Payload::ScriptCancelled { first_expression } => {
            format!("Script cancelled: {}", or_blank(first_expression))
        }
        Payload::PromptString {
            message,
            default_value: Some(default),
        } => format!("Prompt: {} <{default}>", or_blank(message)),
        Payload::PromptString { message, .. } => format!("Prompt: {}", or_blank(message)),
        Payload::PromptPoint { message } => format!("Point prompt: {}", or_blank(message)),
        Payload::PromptSelection { message } => {
            format!("Selection prompt: {}", or_blank(message))
        }
        Payload::Error { message } => format!("Host error: {message}"),
        Payload::Test { message, drawing } => format!(
            "Test message: {} (drawing: {})",
            or_blank(message),
            drawing.as_deref().unwrap_or("none")
        ),
        Payload::SysVar { variable, value } => format!("{variable} = {value}"),
        Payload::SysVarSet { variable, value } => format!("{variable} set to {value}"),
        Payload::Pong => "Pong".to_string(),
        Payload::Unknown { kind, .. } => format!("Unknown message kind {kind}"),
        other @ (Payload::Execute { .. }
        | Payload::RunScript { .. }
        | Payload::GetVar { .. }
        | Payload::SetVar { .. }
        | Payload::Ping) => format!(
            "Unexpected request from host: {}",
            other.kind().map(|k| k.as_str()).unwrap_or_default()
        ),
    }
}
