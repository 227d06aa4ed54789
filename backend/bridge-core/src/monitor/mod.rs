//! External-side session: a dialer, its statistics, and link status, kept
//! current by a single draining task.

pub mod link;

pub use link::{LinkStatus, LinkTracker};

use crate::config::BridgeSettings;
use crate::error::transport::TransportError;
use crate::stats::StatisticsService;
use crate::transport::{Dialer, DialerInbound, DialerOptions, DialerState};

use models::Envelope;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::{RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long a connected host may stay quiet before the link counts as silent.
pub const DEFAULT_SILENCE_THRESHOLD: Duration = Duration::from_secs(30);

const ENVELOPE_FANOUT_CAPACITY: usize = 256;

pub struct BridgeMonitor {
    dialer: Dialer,
    statistics: StatisticsService,
    link: Arc<RwLock<LinkTracker>>,
    envelopes: broadcast::Sender<Envelope>,
    silence_threshold: Duration,
    cancel: CancellationToken,
    drain: JoinHandle<()>,
}

impl BridgeMonitor {
    pub fn start(settings: &BridgeSettings, parent: &CancellationToken) -> Self {
        Self::start_with(
            DialerOptions::from_settings(settings),
            settings.max_history_items,
            parent,
        )
    }

    pub fn start_with(
        options: DialerOptions,
        max_history: usize,
        parent: &CancellationToken,
    ) -> Self {
        let (dialer, inbound) = Dialer::new(options, parent);
        let statistics = StatisticsService::new(max_history);
        let link = Arc::new(RwLock::new(LinkTracker::default()));
        let (envelopes, _) = broadcast::channel(ENVELOPE_FANOUT_CAPACITY);
        let cancel = parent.child_token();

        let drain = tokio::spawn(drain(
            inbound,
            dialer.subscribe_state(),
            statistics.clone(),
            link.clone(),
            envelopes.clone(),
            cancel.clone(),
        ));

        Self {
            dialer,
            statistics,
            link,
            envelopes,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            cancel,
            drain,
        }
    }

    pub fn with_silence_threshold(mut self, threshold: Duration) -> Self {
        self.silence_threshold = threshold;
        self
    }

    pub fn dialer(&self) -> &Dialer {
        &self.dialer
    }

    pub fn statistics(&self) -> &StatisticsService {
        &self.statistics
    }

    /// Every well-formed envelope received, after statistics have seen it.
    pub fn subscribe_envelopes(&self) -> broadcast::Receiver<Envelope> {
        self.envelopes.subscribe()
    }

    /// Connect with the configured retry policy.
    pub async fn connect(&self) -> Result<(), TransportError> {
        self.dialer.connect_with_retry().await
    }

    pub async fn link_status(&self) -> LinkStatus {
        let silence = chrono::Duration::from_std(self.silence_threshold)
            .unwrap_or_else(|_| chrono::Duration::weeks(52));
        self.link.read().await.status_at(Utc::now(), silence)
    }

    pub async fn shutdown(self) {
        self.dialer.shutdown().await;
        self.cancel.cancel();
        if let Err(e) = self.drain.await {
            error!("Monitor drain task ended abnormally: {e}");
        }
    }
}

async fn drain(
    mut inbound: DialerInbound,
    mut state_rx: watch::Receiver<DialerState>,
    statistics: StatisticsService,
    link: Arc<RwLock<LinkTracker>>,
    envelopes: broadcast::Sender<Envelope>,
    cancel: CancellationToken,
) {
    loop {
        // State first: a connect is published before its first record is
        // queued, so the reset always precedes that record. Records of the
        // previous link still queued at that point are skipped by `inbound`.
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                match state {
                    DialerState::Connected => {
                        statistics.reset().await;
                        link.write().await.connected(Utc::now());
                        info!("Session statistics reset for new connection");
                    }
                    DialerState::Disconnected => link.write().await.disconnected(),
                    DialerState::Connecting => {}
                }
            }

            item = inbound.recv() => {
                let Some(item) = item else {
                    break;
                };

                let envelope = match item {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        debug!("Skipped malformed record: {e}");
                        continue;
                    }
                };

                if envelope.kind().is_none() {
                    warn!("Ignoring unknown message kind {}", envelope.kind_name());
                }

                link.write().await.observe(&envelope, Utc::now());
                statistics.apply(&envelope).await;

                if envelopes.send(envelope).is_err() {
                    debug!("No envelope subscribers");
                }
            }
        }
    }
}
