use bridge_core::error::{ExecutorError, HookError};
use bridge_core::hooks::{HostEvent, HostEventSink, HostEventSource, HostExecutor};
use bridge_core::transport::{DialerInbound, DialerOptions, Inbound, ListenerOptions, RetryPolicy};

use common::ErrorLocation;
use models::Envelope;

use std::collections::HashMap;
use std::panic::Location;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

pub const WAIT: Duration = Duration::from_secs(5);

static NEXT_CHANNEL: AtomicUsize = AtomicUsize::new(0);

/// A channel name no other test in this run uses.
pub fn unique_channel(prefix: &str) -> String {
    format!(
        "{prefix}-{}-{}",
        std::process::id(),
        NEXT_CHANNEL.fetch_add(1, Ordering::Relaxed)
    )
}

pub fn listener_options(channel_name: &str) -> ListenerOptions {
    ListenerOptions {
        channel_name: channel_name.to_string(),
        host_version: Some("test-host 1.0".to_string()),
        retry: RetryPolicy::fixed(Duration::from_millis(100)),
        inbound_capacity: 32,
    }
}

pub fn dialer_options(channel_name: &str) -> DialerOptions {
    DialerOptions {
        channel_name: channel_name.to_string(),
        connect_timeout: WAIT,
        retry: RetryPolicy::fixed(Duration::from_millis(100)).with_max_attempts(3),
        inbound_capacity: 32,
    }
}

/// Either end's inbound sequence.
pub trait InboundQueue {
    async fn next_item(&mut self) -> Option<Inbound>;
}

impl InboundQueue for mpsc::Receiver<Inbound> {
    async fn next_item(&mut self) -> Option<Inbound> {
        self.recv().await
    }
}

impl InboundQueue for DialerInbound {
    async fn next_item(&mut self) -> Option<Inbound> {
        self.recv().await
    }
}

/// Next inbound item, failing the test if none arrives in time.
pub async fn next_inbound(inbound: &mut impl InboundQueue) -> Inbound {
    tokio::time::timeout(WAIT, inbound.next_item())
        .await
        .expect("timed out waiting for inbound item")
        .expect("inbound sequence closed")
}

pub async fn next_envelope(inbound: &mut impl InboundQueue) -> Envelope {
    next_inbound(inbound).await.expect("well-formed envelope")
}

/// Host event source that hands its sink to the test.
#[derive(Default)]
pub struct FakeEventSource {
    sink: Mutex<Option<HostEventSink>>,
    pub subscribes: AtomicUsize,
    pub unsubscribes: AtomicUsize,
}

impl FakeEventSource {
    pub fn emit(&self, event: HostEvent) -> bool {
        self.sink
            .lock()
            .expect("lock")
            .as_ref()
            .is_some_and(|sink| sink.emit(event))
    }

    pub fn is_subscribed(&self) -> bool {
        self.sink.lock().expect("lock").is_some()
    }

    pub async fn wait_until_subscribed(&self) {
        tokio::time::timeout(WAIT, async {
            while !self.is_subscribed() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("adapter never subscribed");
    }

    /// Wait until `subscribe` has been called `count` times in total.
    pub async fn wait_for_subscribes(&self, count: usize) {
        tokio::time::timeout(WAIT, async {
            while self.subscribes.load(Ordering::SeqCst) < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("adapter never resubscribed");
    }

    pub async fn wait_until_unsubscribed(&self) {
        tokio::time::timeout(WAIT, async {
            while self.is_subscribed() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("adapter never unsubscribed");
    }
}

impl HostEventSource for FakeEventSource {
    fn subscribe(&self, sink: HostEventSink) -> Result<(), HookError> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock().expect("lock") = Some(sink);
        Ok(())
    }

    fn unsubscribe(&self) {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        self.sink.lock().expect("lock").take();
    }
}

/// Executor backed by an in-memory variable table.
#[derive(Default)]
pub struct FakeExecutor {
    pub commands: Mutex<Vec<String>>,
    pub variables: Mutex<HashMap<String, Value>>,
}

impl HostExecutor for FakeExecutor {
    fn execute_command(&self, command: &str) -> Result<(), ExecutorError> {
        self.commands.lock().expect("lock").push(command.to_string());
        Ok(())
    }

    fn execute_script(&self, _expression: &str) -> Result<(), ExecutorError> {
        Ok(())
    }

    fn get_variable(&self, name: &str) -> Result<Value, ExecutorError> {
        self.variables
            .lock()
            .expect("lock")
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutorError::UnknownVariable {
                name: name.to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    fn set_variable(&self, name: &str, value: &Value) -> Result<(), ExecutorError> {
        self.variables
            .lock()
            .expect("lock")
            .insert(name.to_string(), value.clone());
        Ok(())
    }

    fn host_version(&self) -> Option<String> {
        Some("FakeCAD 2025".to_string())
    }

    fn active_document(&self) -> Option<String> {
        Some("Drawing1.dwg".to_string())
    }
}
