use crate::error::BridgeAppError;
use crate::sim::SimulatedHost;

use bridge_core::config::BridgeSettings;
use bridge_core::hooks::BridgeHost;
use bridge_core::transport::{ListenerState, channel_address};

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

const READY_MESSAGE: &str = "Command bridge host simulator ready";

/// Serve the channel as a simulated host until `cancel` fires.
pub async fn run(
    settings: &BridgeSettings,
    interval: Duration,
    host_version: String,
    cancel: &CancellationToken,
) -> Result<(), BridgeAppError> {
    if interval.is_zero() {
        return Err(BridgeAppError::app("--interval-ms must be greater than 0"));
    }

    let host = Arc::new(SimulatedHost::new(host_version));
    let bridge = BridgeHost::start(settings, host.clone(), host.clone(), cancel);
    let mut state = bridge.listener().subscribe_state();

    info!(
        "Simulated host serving '{}' at {}",
        settings.channel_name,
        channel_address(&settings.channel_name).display()
    );

    let scenario_cancel = cancel.child_token();
    let scenario = tokio::spawn({
        let host = host.clone();
        let scenario_cancel = scenario_cancel.clone();
        async move { host.run_scenario(interval, scenario_cancel).await }
    });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                if current == ListenerState::Connected {
                    info!("Monitor attached");
                    if let Err(e) = bridge.send_test(READY_MESSAGE).await {
                        warn!("Failed to send test message: {e}");
                    }
                }
            }
        }
    }

    info!("Stopping simulated host");
    scenario_cancel.cancel();
    if let Err(e) = scenario.await {
        error!("Scenario task ended abnormally: {e}");
    }
    bridge.shutdown().await;

    Ok(())
}
