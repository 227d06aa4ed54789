//! Host-side endpoint: accepts one peer at a time and re-listens forever.

use crate::{BRIDGE_IDENT, BRIDGE_PROTOCOL_VERSION};
use crate::config::BridgeSettings;
use crate::error::transport::TransportError;
use crate::transport::channel::{self, channel_address};
use crate::transport::connection::{ConnectionWriter, Inbound, ReadOutcome, read_records};
use crate::transport::retry::{Retry, RetryPolicy};
use crate::transport::state::ListenerState;

use common::ErrorLocation;
use models::{Envelope, Payload};

use std::convert::identity;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const DEFAULT_INBOUND_CAPACITY: usize = 256;

/// Upper bound on delivering the `shutdown` notice to a peer that stopped reading.
const SHUTDOWN_NOTICE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ListenerOptions {
    pub channel_name: String,
    /// Reported in the `connected` handshake.
    pub host_version: Option<String>,
    /// Delay after an accept or read failure before listening again.
    pub retry: RetryPolicy,
    pub inbound_capacity: usize,
}

impl ListenerOptions {
    pub fn from_settings(settings: &BridgeSettings, host_version: Option<String>) -> Self {
        Self {
            channel_name: settings.channel_name.clone(),
            host_version,
            retry: RetryPolicy::fixed(settings.reconnect_backoff()),
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
        }
    }
}

/// Host-side bridge endpoint.
///
/// Cloning shares the same endpoint. The accept loop runs on its own task
/// until [`Listener::shutdown`] or the parent cancellation token fires.
#[derive(Clone)]
pub struct Listener {
    channel_name: String,
    active: Arc<RwLock<Option<ConnectionWriter>>>,
    state_tx: Arc<watch::Sender<ListenerState>>,
    connection_tx: Arc<watch::Sender<Option<u64>>>,
    cancel: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Listener {
    /// Start listening. Returns the endpoint and its inbound sequence, which
    /// spans every connection the listener accepts.
    pub fn start(
        options: ListenerOptions,
        parent: &CancellationToken,
    ) -> (Self, mpsc::Receiver<Inbound>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(options.inbound_capacity.max(1));
        let (state_tx, _) = watch::channel(ListenerState::Idle);
        let (connection_tx, _) = watch::channel(None);

        let channel_name = options.channel_name.clone();
        let active = Arc::new(RwLock::new(None));
        let state_tx = Arc::new(state_tx);
        let connection_tx = Arc::new(connection_tx);
        let cancel = parent.child_token();

        let task = tokio::spawn(accept_loop(
            options,
            active.clone(),
            state_tx.clone(),
            connection_tx.clone(),
            inbound_tx,
            cancel.clone(),
        ));

        let listener = Self {
            channel_name,
            active,
            state_tx,
            connection_tx,
            cancel,
            task: Arc::new(Mutex::new(Some(task))),
        };

        (listener, inbound_rx)
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn state(&self) -> ListenerState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ListenerState> {
        self.state_tx.subscribe()
    }

    /// Identifier of the attached peer, `None` while no peer is attached.
    ///
    /// Every accepted connection gets a fresh identifier, so a watcher that
    /// misses the gap between two peers still sees the value change.
    pub fn subscribe_connection(&self) -> watch::Receiver<Option<u64>> {
        self.connection_tx.subscribe()
    }

    /// Send one envelope to the connected peer.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotConnected`] when no peer is attached. The envelope
    /// is dropped, never queued.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let writer = self.active.read().await.clone();

        match writer {
            Some(writer) => writer.send(envelope).await,
            None => Err(TransportError::NotConnected {
                message: format!(
                    "No client on '{}'; dropped {}",
                    self.channel_name,
                    envelope.kind_name()
                ),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }

    /// Notify the peer with a best-effort `shutdown`, then stop the accept loop.
    pub async fn shutdown(&self) {
        let writer = self.active.write().await.take();

        if let Some(writer) = writer {
            notify_shutdown(&writer).await;
        }

        self.cancel.cancel();

        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Listener task ended abnormally: {e}");
            }
        }

        self.state_tx.send_replace(ListenerState::Stopped);
        info!("Listener on '{}' stopped", self.channel_name);
    }
}

async fn accept_loop(
    options: ListenerOptions,
    active: Arc<RwLock<Option<ConnectionWriter>>>,
    state_tx: Arc<watch::Sender<ListenerState>>,
    connection_tx: Arc<watch::Sender<Option<u64>>>,
    inbound_tx: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) {
    let address = channel_address(&options.channel_name);
    let handshake = Payload::Connected {
        version: BRIDGE_PROTOCOL_VERSION.to_string(),
        host_version: options.host_version.clone(),
    };
    let mut retry = options.retry.start();
    let mut connection_id = 0u64;
    info!("{BRIDGE_IDENT} serving '{}'", options.channel_name);

    loop {
        state_tx.send_replace(ListenerState::Listening);
        info!("Waiting for a bridge client on {}", address.display());

        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = channel::accept_one(&options.channel_name) => accepted,
        };

        let (reader, writer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                if !wait_before_retry(&mut retry, &cancel, &format!("Accept failed: {e}")).await {
                    break;
                }
                continue;
            }
        };

        let writer = ConnectionWriter::new(writer);

        // The handshake precedes any other outbound traffic.
        if let Err(e) = writer.send(&Envelope::new(handshake.clone())).await {
            warn!("Client left before the handshake: {e}");
            continue;
        }

        connection_id += 1;
        *active.write().await = Some(writer);
        state_tx.send_replace(ListenerState::Connected);
        connection_tx.send_replace(Some(connection_id));
        retry.reset();
        info!("Bridge client {connection_id} connected on {}", address.display());

        let outcome = read_records(reader, &inbound_tx, identity, &cancel).await;

        let writer = active.write().await.take();
        connection_tx.send_replace(None);

        match outcome {
            ReadOutcome::PeerClosed => info!("Bridge client {connection_id} disconnected"),
            ReadOutcome::Failed(e) => {
                if !wait_before_retry(&mut retry, &cancel, &format!("Connection lost: {e}")).await {
                    break;
                }
            }
            ReadOutcome::Cancelled => {
                // `shutdown()` takes the writer before cancelling; one left here means the parent token fired.
                if let Some(writer) = writer {
                    notify_shutdown(&writer).await;
                }
                break;
            }
            ReadOutcome::ConsumerGone => {
                info!("Inbound consumer dropped; listener exiting");
                break;
            }
        }
    }

    active.write().await.take();
    connection_tx.send_replace(None);
    state_tx.send_replace(ListenerState::Stopped);
}

/// Best-effort `shutdown` notice, then close the write half.
async fn notify_shutdown(writer: &ConnectionWriter) {
    let notice = Envelope::new(Payload::Shutdown);

    match tokio::time::timeout(SHUTDOWN_NOTICE_TIMEOUT, writer.send(&notice)).await {
        Ok(Ok(())) => debug!("Shutdown notice sent"),
        Ok(Err(e)) => debug!("Shutdown notice not delivered: {e}"),
        Err(_) => debug!("Shutdown notice timed out after {SHUTDOWN_NOTICE_TIMEOUT:?}"),
    }
    writer.close().await;
}

/// Sleep per the retry policy. Returns `false` if the loop should exit.
async fn wait_before_retry(
    retry: &mut Retry,
    cancel: &CancellationToken,
    reason: &str,
) -> bool {
    let Some(delay) = retry.next_delay() else {
        error!("{reason}; giving up after {} attempts", retry.failures());
        return false;
    };

    warn!("{reason}; listening again in {delay:?}");

    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
