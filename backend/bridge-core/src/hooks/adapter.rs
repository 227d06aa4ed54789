//! Host-side glue between the host application and the listener.
//!
//! [`HookAdapter`] holds the translation rules and is runtime-free.
//! [`BridgeHost`] runs it against a live [`Listener`]: it subscribes to host
//! events for the lifetime of each connection, forwards them as envelopes,
//! and answers inbound requests through the [`HostExecutor`].

use crate::config::BridgeSettings;
use crate::error::transport::TransportError;
use crate::hooks::events::{HostEvent, HostEventSink, HostEventSource};
use crate::hooks::executor::HostExecutor;
use crate::transport::{Inbound, Listener, ListenerOptions};

use models::{Envelope, Payload};

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Translation between host events, inbound requests, and envelopes.
pub struct HookAdapter {
    executor: Arc<dyn HostExecutor>,
    /// First line of the script currently running, stamped onto its end.
    running_script: Option<String>,
}

impl HookAdapter {
    pub fn new(executor: Arc<dyn HostExecutor>) -> Self {
        Self {
            executor,
            running_script: None,
        }
    }

    /// One host event becomes exactly one envelope.
    pub fn translate(&mut self, event: HostEvent) -> Envelope {
        let payload = match event {
            HostEvent::CommandWillStart { command } => Payload::CommandStart { command },
            HostEvent::CommandEnded { command } => Payload::CommandEnd { command },
            HostEvent::CommandCancelled { command } => Payload::CommandCancelled { command },
            HostEvent::CommandFailed { command, error } => Payload::CommandFailed { command, error },
            HostEvent::ScriptWillStart { first_line } => {
                self.running_script = first_line.clone();
                Payload::ScriptStart {
                    first_expression: first_line,
                }
            }
            HostEvent::ScriptEnded => Payload::ScriptEnd {
                first_expression: self.running_script.take(),
            },
            HostEvent::ScriptCancelled => Payload::ScriptCancelled {
                first_expression: self.running_script.take(),
            },
            HostEvent::PromptingForString {
                message,
                default_value,
            } => Payload::PromptString {
                message,
                default_value,
            },
            HostEvent::PromptingForPoint { message } => Payload::PromptPoint { message },
            HostEvent::PromptingForSelection { message } => Payload::PromptSelection { message },
        };

        Envelope::new(payload)
    }

    /// Handle one inbound item. Returns the reply to send, if any.
    pub fn dispatch(&self, inbound: Inbound) -> Option<Envelope> {
        let envelope = match inbound {
            Ok(envelope) => envelope,
            Err(e) => {
                return Some(Envelope::error(format!(
                    "Failed to process command: {}",
                    e.reason()
                )));
            }
        };

        debug!("Dispatching {}", envelope.kind_name());

        match envelope.payload {
            Payload::Execute { command } => {
                if command.trim().is_empty() {
                    return Some(Envelope::error("Failed to process command: empty command"));
                }
                self.executor
                    .execute_command(&command)
                    .err()
                    .map(|e| Envelope::error(format!("Failed to process command: {}", e.reason())))
            }
            Payload::RunScript { expression } => {
                if expression.trim().is_empty() {
                    return Some(Envelope::error("Failed to process command: empty expression"));
                }
                self.executor
                    .execute_script(&expression)
                    .err()
                    .map(|e| Envelope::error(format!("Failed to process command: {}", e.reason())))
            }
            Payload::GetVar { variable } => Some(match self.executor.get_variable(&variable) {
                Ok(value) => Envelope::new(Payload::SysVar { variable, value }),
                Err(e) => Envelope::error(format!("Failed to get {variable}: {}", e.reason())),
            }),
            Payload::SetVar { variable, value } => {
                Some(match self.executor.set_variable(&variable, &value) {
                    Ok(()) => Envelope::new(Payload::SysVarSet { variable, value }),
                    Err(e) => Envelope::error(format!("Failed to set {variable}: {}", e.reason())),
                })
            }
            Payload::Ping => Some(Envelope::new(Payload::Pong)),
            other => {
                let kind = Envelope::at(other, envelope.timestamp).kind_name().to_string();
                warn!("Ignoring unsupported inbound {kind}");
                Some(Envelope::error(format!("Unsupported message type: {kind}")))
            }
        }
    }

    /// Forget per-connection state.
    pub fn clear(&mut self) {
        self.running_script = None;
    }
}

/// A running host-side bridge.
pub struct BridgeHost {
    listener: Listener,
    executor: Arc<dyn HostExecutor>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl BridgeHost {
    pub fn start(
        settings: &BridgeSettings,
        source: Arc<dyn HostEventSource>,
        executor: Arc<dyn HostExecutor>,
        parent: &CancellationToken,
    ) -> Self {
        let options = ListenerOptions::from_settings(settings, executor.host_version());
        Self::start_with(options, source, executor, parent)
    }

    pub fn start_with(
        options: ListenerOptions,
        source: Arc<dyn HostEventSource>,
        executor: Arc<dyn HostExecutor>,
        parent: &CancellationToken,
    ) -> Self {
        let (listener, inbound) = Listener::start(options, parent);
        let cancel = parent.child_token();

        let task = tokio::spawn(run_adapter(
            HookAdapter::new(executor.clone()),
            listener.clone(),
            source,
            inbound,
            listener.subscribe_connection(),
            cancel.clone(),
        ));

        Self {
            listener,
            executor,
            cancel,
            task,
        }
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    /// Push a `test` envelope naming the active document.
    pub async fn send_test(&self, message: impl Into<String>) -> Result<(), TransportError> {
        self.listener
            .send(&Envelope::new(Payload::Test {
                message: Some(message.into()),
                drawing: self.executor.active_document(),
            }))
            .await
    }

    /// Unsubscribe from the host, then shut the listener down.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!("Hook adapter task ended abnormally: {e}");
        }
        self.listener.shutdown().await;
    }
}

/// Host event subscription held for exactly one connection at a time.
struct Subscription {
    source: Arc<dyn HostEventSource>,
    sink_tx: mpsc::UnboundedSender<HostEvent>,
    connection: Option<u64>,
}

impl Subscription {
    /// Drop a subscription that belongs to any connection but `current`.
    /// Returns `true` if one was dropped.
    fn detach_stale(&mut self, current: Option<u64>) -> bool {
        match self.connection {
            Some(held) if Some(held) != current => {
                self.source.unsubscribe();
                self.connection = None;
                info!("Unsubscribed from host events (client {held})");
                true
            }
            _ => false,
        }
    }

    fn attach(&mut self, current: Option<u64>) {
        let Some(id) = current else {
            return;
        };
        if self.connection.is_some() {
            return;
        }

        match self.source.subscribe(HostEventSink::new(self.sink_tx.clone())) {
            Ok(()) => {
                self.connection = Some(id);
                info!("Subscribed to host events (client {id})");
            }
            Err(e) => error!("Failed to subscribe to host events: {e}"),
        }
    }

    fn release(&mut self) {
        self.detach_stale(None);
    }
}

async fn run_adapter(
    mut adapter: HookAdapter,
    listener: Listener,
    source: Arc<dyn HostEventSource>,
    mut inbound: mpsc::Receiver<Inbound>,
    mut connection_rx: watch::Receiver<Option<u64>>,
    cancel: CancellationToken,
) {
    let (sink_tx, mut events) = mpsc::unbounded_channel();
    let mut subscription = Subscription {
        source,
        sink_tx,
        connection: None,
    };

    let initial = *connection_rx.borrow_and_update();
    subscription.attach(initial);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            changed = connection_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                // A peer may leave and another arrive between two polls; the
                // identifier still differs, so the old subscription is dropped.
                let current = *connection_rx.borrow_and_update();
                if subscription.detach_stale(current) {
                    adapter.clear();
                    // Events raised after the peer left have nowhere to go.
                    while events.try_recv().is_ok() {}
                }
                subscription.attach(current);
            }

            Some(event) = events.recv() => {
                let envelope = adapter.translate(event);
                if let Err(e) = listener.send(&envelope).await {
                    warn!("Dropped {} event: {e}", envelope.kind_name());
                }
            }

            item = inbound.recv() => {
                let Some(item) = item else {
                    break;
                };
                if let Some(reply) = adapter.dispatch(item) {
                    if let Err(e) = listener.send(&reply).await {
                        warn!("Failed to send {} reply: {e}", reply.kind_name());
                    }
                }
            }
        }
    }

    subscription.release();
}
