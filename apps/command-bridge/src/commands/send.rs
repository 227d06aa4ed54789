use crate::cli::Request;
use crate::error::BridgeAppError;

use bridge_core::config::BridgeSettings;
use bridge_core::transport::{Dialer, DialerInbound, DialerOptions, DialerState};

use models::{Envelope, Payload};

use log::{debug, warn};
use tokio_util::sync::CancellationToken;

/// Connect, send one request, and return the host's first reply to it.
///
/// Execute and script requests have no success reply of their own, so a
/// ping follows them. Records arrive in order, so a `pong` means the host
/// accepted the request and an `error` means it did not.
pub async fn run(
    settings: &BridgeSettings,
    request: &Request,
    cancel: &CancellationToken,
) -> Result<Envelope, BridgeAppError> {
    let (dialer, mut inbound) = Dialer::new(DialerOptions::from_settings(settings), cancel);
    dialer.connect_with_retry().await?;

    let result = exchange(settings, &dialer, &mut inbound, request, cancel).await;
    dialer.shutdown().await;
    result
}

async fn exchange(
    settings: &BridgeSettings,
    dialer: &Dialer,
    inbound: &mut DialerInbound,
    request: &Request,
    cancel: &CancellationToken,
) -> Result<Envelope, BridgeAppError> {
    match request {
        Request::Execute { command } => {
            dialer.send_command(command.as_str()).await?;
            dialer.ping().await?;
        }
        Request::Lisp { expression } => {
            dialer.send_script(expression.as_str()).await?;
            dialer.ping().await?;
        }
        Request::Getvar { name } => dialer.get_variable(name.as_str()).await?,
        Request::Setvar { name, value } => {
            dialer.set_variable(name.as_str(), value.clone()).await?
        }
        Request::Ping => dialer.ping().await?,
    }

    let mut state = dialer.subscribe_state();
    let wait = settings.connection_timeout();
    let reply = tokio::time::timeout(wait, async {
        loop {
            tokio::select! {
                // Records already queued are read before a disconnect is honoured.
                biased;

                _ = cancel.cancelled() => return None,
                item = inbound.recv() => {
                    let Some(item) = item else {
                        return None;
                    };
                    match item {
                        Ok(envelope) if is_reply_to(request, &envelope) => return Some(envelope),
                        Ok(envelope) => {
                            debug!("Skipping {} while waiting for reply", envelope.kind_name())
                        }
                        Err(e) => warn!("Skipping malformed record: {e}"),
                    }
                }
                _ = state.wait_for(|s| *s == DialerState::Disconnected) => return None,
            }
        }
    })
    .await;

    match reply {
        Ok(Some(envelope)) => Ok(envelope),
        Ok(None) => Err(BridgeAppError::app(format!(
            "Connection to '{}' ended before the host replied",
            settings.channel_name
        ))),
        Err(_) => Err(BridgeAppError::app(format!(
            "No reply from '{}' within {} ms",
            settings.channel_name, settings.connection_timeout_ms
        ))),
    }
}

/// Whether `envelope` answers `request`. An `error` answers anything.
pub fn is_reply_to(request: &Request, envelope: &Envelope) -> bool {
    match (&envelope.payload, request) {
        (Payload::Error { .. }, _) => true,
        (Payload::SysVar { variable, .. }, Request::Getvar { name }) => {
            variable.eq_ignore_ascii_case(name)
        }
        (Payload::SysVarSet { variable, .. }, Request::Setvar { name, .. }) => {
            variable.eq_ignore_ascii_case(name)
        }
        (Payload::Pong, Request::Execute { .. } | Request::Lisp { .. } | Request::Ping) => true,
        _ => false,
    }
}
