//! External-side endpoint: connects to a host listener on demand.

use crate::BRIDGE_NOT_RUNNING_HINT;
use crate::config::BridgeSettings;
use crate::error::transport::TransportError;
use crate::transport::channel::{self, ChannelReader, ChannelWriter};
use crate::transport::connection::{ConnectionWriter, Inbound, ReadOutcome, read_records};
use crate::transport::retry::RetryPolicy;
use crate::transport::state::DialerState;

use common::ErrorLocation;
use models::{Envelope, Payload};

use std::io::Error as IoError;
use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::{RwLock, mpsc, watch};
use tokio_util::sync::CancellationToken;

const DEFAULT_INBOUND_CAPACITY: usize = 256;

/// How often a pending connect re-checks for a listener.
const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct DialerOptions {
    pub channel_name: String,
    /// Upper bound on a single `connect`.
    pub connect_timeout: Duration,
    /// Used by [`Dialer::connect_with_retry`].
    pub retry: RetryPolicy,
    pub inbound_capacity: usize,
}

impl DialerOptions {
    pub fn from_settings(settings: &BridgeSettings) -> Self {
        Self {
            channel_name: settings.channel_name.clone(),
            connect_timeout: settings.connection_timeout(),
            retry: RetryPolicy::fixed(settings.reconnect_backoff())
                .with_max_attempts(settings.connect_attempts),
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
        }
    }
}

/// An inbound item tagged with the generation of the link that read it.
type Tagged = (u64, Inbound);

/// Inbound sequence of a [`Dialer`], shared by all of its connections.
///
/// Items still queued from a link that has since been replaced are skipped,
/// so nothing from the previous connection follows the next `Connected`.
pub struct DialerInbound {
    rx: mpsc::Receiver<Tagged>,
    generation: Arc<AtomicU64>,
}

impl DialerInbound {
    /// Next item from the current link. `None` once the dialer is dropped.
    pub async fn recv(&mut self) -> Option<Inbound> {
        loop {
            let (generation, item) = self.rx.recv().await?;
            if generation == self.generation.load(Ordering::SeqCst) {
                return Some(item);
            }
            debug!("Skipping record from replaced connection {generation}");
        }
    }
}

struct ActiveLink {
    generation: u64,
    writer: ConnectionWriter,
    cancel: CancellationToken,
}

/// External-side bridge endpoint. Cloning shares the same endpoint.
#[derive(Clone)]
pub struct Dialer {
    options: Arc<DialerOptions>,
    active: Arc<RwLock<Option<ActiveLink>>>,
    state_tx: Arc<watch::Sender<DialerState>>,
    inbound_tx: mpsc::Sender<Tagged>,
    generation: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl Dialer {
    /// Create a disconnected dialer and its inbound sequence. The sequence is
    /// shared by every connection this dialer makes.
    pub fn new(options: DialerOptions, parent: &CancellationToken) -> (Self, DialerInbound) {
        let (inbound_tx, rx) = mpsc::channel(options.inbound_capacity.max(1));
        let (state_tx, _) = watch::channel(DialerState::Disconnected);
        let generation = Arc::new(AtomicU64::new(0));

        let dialer = Self {
            options: Arc::new(options),
            active: Arc::new(RwLock::new(None)),
            state_tx: Arc::new(state_tx),
            inbound_tx,
            generation: generation.clone(),
            cancel: parent.child_token(),
        };

        (dialer, DialerInbound { rx, generation })
    }

    pub fn channel_name(&self) -> &str {
        &self.options.channel_name
    }

    pub fn state(&self) -> DialerState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<DialerState> {
        self.state_tx.subscribe()
    }

    /// Connect once, bounded by the configured timeout.
    ///
    /// Returns immediately if already connected.
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectionUnavailable`] on timeout, refusal, or
    /// cancellation. The dialer is left `Disconnected`.
    pub async fn connect(&self) -> Result<(), TransportError> {
        if self.active.read().await.is_some() {
            return Ok(());
        }

        self.state_tx.send_replace(DialerState::Connecting);

        let name = self.options.channel_name.clone();
        let timeout = self.options.connect_timeout;

        let attempt = tokio::select! {
            _ = self.cancel.cancelled() => Err(unavailable(format!("connect to '{name}' cancelled"))),
            opened = tokio::time::timeout(timeout, open_when_ready(&name)) => match opened {
                Ok(Ok(pair)) => Ok(pair),
                Ok(Err(e)) => Err(unavailable(format!("connect to '{name}' failed: {e}"))),
                Err(_) => Err(unavailable(format!("connect to '{name}' timed out after {timeout:?}"))),
            },
        };

        let (reader, writer) = match attempt {
            Ok(pair) => pair,
            Err(e) => {
                self.state_tx.send_replace(DialerState::Disconnected);
                return Err(e);
            }
        };

        self.attach(reader, writer).await;
        info!("Connected to bridge on '{name}'");
        Ok(())
    }

    /// Connect, retrying per the configured policy.
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectionUnavailable`] once attempts are exhausted,
    /// with a hint that the host side is probably not running.
    pub async fn connect_with_retry(&self) -> Result<(), TransportError> {
        let mut retry = self.options.retry.start();

        loop {
            let error = match self.connect().await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            let Some(delay) = retry.next_delay() else {
                return Err(unavailable(format!(
                    "No bridge answered on '{}' after {} attempts. {BRIDGE_NOT_RUNNING_HINT}",
                    self.options.channel_name,
                    retry.failures()
                )));
            };

            warn!(
                "Connect attempt {} failed: {error}; retrying in {delay:?}",
                retry.failures()
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(unavailable("connect retry cancelled"));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Drop the current connection, if any. The inbound sequence stays open.
    pub async fn disconnect(&self) {
        let link = self.active.write().await.take();

        if let Some(link) = link {
            link.cancel.cancel();
            link.writer.close().await;
            self.state_tx.send_replace(DialerState::Disconnected);
            info!("Disconnected from bridge on '{}'", self.options.channel_name);
        }
    }

    /// Disconnect and stop all work owned by this dialer.
    pub async fn shutdown(&self) {
        self.disconnect().await;
        self.cancel.cancel();
    }

    /// # Errors
    ///
    /// [`TransportError::NotConnected`] when there is no connection.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let writer = self
            .active
            .read()
            .await
            .as_ref()
            .map(|link| link.writer.clone());

        match writer {
            Some(writer) => writer.send(envelope).await,
            None => Err(TransportError::NotConnected {
                message: format!(
                    "Not connected to '{}'; dropped {}",
                    self.options.channel_name,
                    envelope.kind_name()
                ),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }

    pub async fn send_command(&self, command: impl Into<String>) -> Result<(), TransportError> {
        self.send(&Envelope::new(Payload::Execute {
            command: command.into(),
        }))
        .await
    }

    pub async fn send_script(&self, expression: impl Into<String>) -> Result<(), TransportError> {
        self.send(&Envelope::new(Payload::RunScript {
            expression: expression.into(),
        }))
        .await
    }

    pub async fn get_variable(&self, variable: impl Into<String>) -> Result<(), TransportError> {
        self.send(&Envelope::new(Payload::GetVar {
            variable: variable.into(),
        }))
        .await
    }

    pub async fn set_variable(
        &self,
        variable: impl Into<String>,
        value: Value,
    ) -> Result<(), TransportError> {
        self.send(&Envelope::new(Payload::SetVar {
            variable: variable.into(),
            value,
        }))
        .await
    }

    pub async fn ping(&self) -> Result<(), TransportError> {
        self.send(&Envelope::new(Payload::Ping)).await
    }

    async fn attach(&self, reader: ChannelReader, writer: ChannelWriter) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let link_cancel = self.cancel.child_token();

        let previous = self.active.write().await.replace(ActiveLink {
            generation,
            writer: ConnectionWriter::new(writer),
            cancel: link_cancel.clone(),
        });
        if let Some(previous) = previous {
            debug!("Replacing connection from a concurrent connect");
            previous.cancel.cancel();
        }
        // Connected is published before the first inbound item can arrive.
        self.state_tx.send_replace(DialerState::Connected);

        let active = self.active.clone();
        let state_tx = self.state_tx.clone();
        let inbound_tx = self.inbound_tx.clone();
        let name = self.options.channel_name.clone();

        tokio::spawn(async move {
            let outcome =
                read_records(reader, &inbound_tx, |item| (generation, item), &link_cancel).await;

            match &outcome {
                ReadOutcome::PeerClosed => info!("Bridge on '{name}' closed the connection"),
                ReadOutcome::Failed(e) => warn!("Connection to '{name}' lost: {e}"),
                ReadOutcome::Cancelled => debug!("Read loop for '{name}' cancelled"),
                ReadOutcome::ConsumerGone => debug!("Inbound consumer for '{name}' dropped"),
            }

            // A newer connection may already own the slot.
            let mut slot = active.write().await;
            if slot.as_ref().map(|link| link.generation) == Some(generation) {
                if let Some(link) = slot.take() {
                    link.writer.close().await;
                }
                state_tx.send_replace(DialerState::Disconnected);
            }
        });
    }
}

async fn open_when_ready(name: &str) -> Result<(ChannelReader, ChannelWriter), IoError> {
    loop {
        match channel::open(name).await {
            Ok(pair) => return Ok(pair),
            Err(e) if channel::is_not_ready(&e) => {
                tokio::time::sleep(CONNECT_POLL_INTERVAL).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[track_caller]
fn unavailable(message: impl Into<String>) -> TransportError {
    TransportError::ConnectionUnavailable {
        message: message.into(),
        location: ErrorLocation::from(Location::caller()),
    }
}
