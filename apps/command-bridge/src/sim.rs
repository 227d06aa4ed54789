//! A stand-in host application for exercising the bridge without a real host.
//!
//! [`SimulatedHost`] is both the event source and the executor. Requests it
//! receives produce the same start/end events a real host would raise, and
//! [`SimulatedHost::run_scenario`] replays a scripted drawing session.

use bridge_core::error::{ExecutorError, HookError};
use bridge_core::hooks::{HostEvent, HostEventSink, HostEventSource, HostExecutor};

use common::ErrorLocation;

use std::collections::HashMap;
use std::panic::Location;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub const SIMULATED_DOCUMENT: &str = "Drawing1.dwg";

pub struct SimulatedHost {
    host_version: String,
    sink: Mutex<Option<HostEventSink>>,
    variables: Mutex<HashMap<String, Value>>,
}

impl SimulatedHost {
    pub fn new(host_version: impl Into<String>) -> Self {
        let variables = HashMap::from([
            ("OSMODE".to_string(), json!(4133)),
            ("CLAYER".to_string(), json!("0")),
            ("FILEDIA".to_string(), json!(1)),
            ("CMDECHO".to_string(), json!(1)),
        ]);

        Self {
            host_version: host_version.into(),
            sink: Mutex::new(None),
            variables: Mutex::new(variables),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Raise one event. Returns `false` when nobody is subscribed.
    pub fn raise(&self, event: HostEvent) -> bool {
        let sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        match sink.as_ref() {
            Some(sink) => sink.emit(event),
            None => false,
        }
    }

    /// Replay [`scenario`] every `interval` while a peer is subscribed,
    /// looping until `cancel` fires.
    pub async fn run_scenario(&self, interval: Duration, cancel: CancellationToken) {
        let steps = scenario();
        let mut next = 0;
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !self.is_subscribed() {
                        continue;
                    }
                    if next == 0 {
                        info!("Replaying simulated session ({} steps)", steps.len());
                    }
                    for event in &steps[next] {
                        debug!("Simulated event: {event:?}");
                        self.raise(event.clone());
                    }
                    next = (next + 1) % steps.len();
                }
            }
        }
    }
}

impl HostEventSource for SimulatedHost {
    fn subscribe(&self, sink: HostEventSink) -> Result<(), HookError> {
        let mut slot = self.sink.lock().map_err(|e| HookError::Subscribe {
            message: format!("Simulated host state poisoned: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;
        *slot = Some(sink);
        Ok(())
    }

    fn unsubscribe(&self) {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl HostExecutor for SimulatedHost {
    fn execute_command(&self, command: &str) -> Result<(), ExecutorError> {
        let name = command
            .split_whitespace()
            .next()
            .unwrap_or(command)
            .to_uppercase();
        info!("Simulated host executing {name}");

        self.raise(HostEvent::CommandWillStart {
            command: name.clone(),
        });
        self.raise(HostEvent::CommandEnded { command: name });
        Ok(())
    }

    fn execute_script(&self, expression: &str) -> Result<(), ExecutorError> {
        let first_line = expression.lines().next().map(str::to_string);
        info!("Simulated host evaluating {expression}");

        self.raise(HostEvent::ScriptWillStart { first_line });
        self.raise(HostEvent::ScriptEnded);
        Ok(())
    }

    fn get_variable(&self, name: &str) -> Result<Value, ExecutorError> {
        let key = name.to_uppercase();
        self.variables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .ok_or_else(|| ExecutorError::UnknownVariable {
                name: key,
                location: ErrorLocation::from(Location::caller()),
            })
    }

    fn set_variable(&self, name: &str, value: &Value) -> Result<(), ExecutorError> {
        if value.is_null() {
            return Err(ExecutorError::Failed {
                message: format!("no value given for {name}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        self.variables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_uppercase(), value.clone());
        Ok(())
    }

    fn host_version(&self) -> Option<String> {
        Some(self.host_version.clone())
    }

    fn active_document(&self) -> Option<String> {
        Some(SIMULATED_DOCUMENT.to_string())
    }
}

fn command(name: &str) -> HostEvent {
    HostEvent::CommandWillStart {
        command: name.to_string(),
    }
}

fn ended(name: &str) -> HostEvent {
    HostEvent::CommandEnded {
        command: name.to_string(),
    }
}

fn failed(name: &str, error: &str) -> HostEvent {
    HostEvent::CommandFailed {
        command: name.to_string(),
        error: Some(error.to_string()),
    }
}

/// One simulated drawing session. Each step is raised on a single tick, so a
/// command's start and end land one interval apart.
pub fn scenario() -> Vec<Vec<HostEvent>> {
    vec![
        vec![command("LINE")],
        vec![
            HostEvent::PromptingForPoint {
                message: Some("Specify first point:".to_string()),
            },
        ],
        vec![ended("LINE")],
        vec![command("CIRCLE")],
        vec![failed("CIRCLE", "bad argument type: numberp nil")],
        vec![command("ZOOM"), ended("ZOOM")],
        vec![HostEvent::ScriptWillStart {
            first_line: Some("(setq pt (getpoint))".to_string()),
        }],
        vec![HostEvent::ScriptEnded],
        vec![command("PAN")],
        vec![HostEvent::CommandCancelled {
            command: "PAN".to_string(),
        }],
        vec![command("MOVE")],
        vec![
            HostEvent::PromptingForSelection {
                message: Some("Select objects:".to_string()),
            },
        ],
        vec![failed("MOVE", "too few arguments")],
        vec![command("COPY")],
        vec![ended("COPY")],
        vec![command("LAYER")],
        vec![
            HostEvent::PromptingForString {
                message: Some("Enter layer name:".to_string()),
                default_value: Some("0".to_string()),
            },
        ],
        vec![ended("LAYER")],
        vec![command("ERASE")],
        vec![failed("ERASE", "syntax error")],
    ]
}
