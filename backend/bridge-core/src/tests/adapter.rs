// Unit tests for the hook adapter's translation and dispatch rules
// The executor is a recording fake; no channel is involved

use crate::codec::decode;
use crate::error::ExecutorError;
use crate::hooks::{HookAdapter, HostEvent, HostExecutor};

use common::ErrorLocation;
use models::{Envelope, Payload};

use std::collections::HashMap;
use std::panic::Location;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

#[derive(Default)]
struct RecordingExecutor {
    commands: Mutex<Vec<String>>,
    scripts: Mutex<Vec<String>>,
    variables: Mutex<HashMap<String, Value>>,
    fail_commands: bool,
}

impl HostExecutor for RecordingExecutor {
    fn execute_command(&self, command: &str) -> Result<(), ExecutorError> {
        if self.fail_commands {
            return Err(ExecutorError::Failed {
                message: format!("no document open for {command}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        self.commands.lock().expect("lock").push(command.to_string());
        Ok(())
    }

    fn execute_script(&self, expression: &str) -> Result<(), ExecutorError> {
        self.scripts.lock().expect("lock").push(expression.to_string());
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
}

fn adapter_with(executor: RecordingExecutor) -> (HookAdapter, Arc<RecordingExecutor>) {
    let executor = Arc::new(executor);
    (HookAdapter::new(executor.clone()), executor)
}

fn error_message(reply: Option<Envelope>) -> String {
    match reply.map(|envelope| envelope.payload) {
        Some(Payload::Error { message }) => message,
        other => panic!("expected error reply, got {other:?}"),
    }
}

// ============================================
// HOST EVENTS → ENVELOPES
// ============================================

#[test]
fn given_command_events_when_translated_then_matching_kinds() {
    let (mut adapter, _) = adapter_with(RecordingExecutor::default());

    let start = adapter.translate(HostEvent::CommandWillStart {
        command: "LINE".to_string(),
    });
    let failed = adapter.translate(HostEvent::CommandFailed {
        command: "LINE".to_string(),
        error: Some("Invalid selection".to_string()),
    });

    assert_eq!(start.kind_name(), "command_start");
    assert_eq!(start.identifier(), Some("LINE"));
    assert_eq!(
        failed.payload,
        Payload::CommandFailed {
            command: "LINE".to_string(),
            error: Some("Invalid selection".to_string()),
        }
    );
}

/// **VALUE**: Verifies script end/cancel envelopes carry the first line of the
/// script that started, so the external side can correlate them.
///
/// **BUG THIS CATCHES**: Would catch the remembered line leaking into the next
/// script run after it ended.
#[test]
fn given_script_run_when_translated_then_end_stamped_with_first_line() {
    let (mut adapter, _) = adapter_with(RecordingExecutor::default());

    adapter.translate(HostEvent::ScriptWillStart {
        first_line: Some("(defun c:hello ()".to_string()),
    });
    let ended = adapter.translate(HostEvent::ScriptEnded);
    let stray_cancel = adapter.translate(HostEvent::ScriptCancelled);

    assert_eq!(ended.kind_name(), "lisp_end");
    assert_eq!(ended.identifier(), Some("(defun c:hello ()"));
    assert_eq!(stray_cancel.identifier(), None);
}

#[test]
fn given_cleared_adapter_when_script_ends_then_no_identifier() {
    let (mut adapter, _) = adapter_with(RecordingExecutor::default());
    adapter.translate(HostEvent::ScriptWillStart {
        first_line: Some("(princ)".to_string()),
    });

    adapter.clear();

    assert_eq!(adapter.translate(HostEvent::ScriptEnded).identifier(), None);
}

#[test]
fn given_prompt_events_when_translated_then_prompt_kinds() {
    let (mut adapter, _) = adapter_with(RecordingExecutor::default());

    let string = adapter.translate(HostEvent::PromptingForString {
        message: Some("Enter tag".to_string()),
        default_value: Some("A-1".to_string()),
    });
    let point = adapter.translate(HostEvent::PromptingForPoint { message: None });
    let selection = adapter.translate(HostEvent::PromptingForSelection {
        message: Some("Select objects".to_string()),
    });

    assert_eq!(string.kind_name(), "prompt_string");
    assert_eq!(point.kind_name(), "prompt_point");
    assert_eq!(selection.kind_name(), "prompt_selection");
}

// ============================================
// INBOUND → EXECUTOR
// ============================================

#[test]
fn given_execute_when_dispatched_then_executor_called_without_reply() {
    let (adapter, executor) = adapter_with(RecordingExecutor::default());

    let reply = adapter.dispatch(decode(r#"{"type":"execute","command":"ZOOM E"}"#));

    assert!(reply.is_none());
    assert_eq!(*executor.commands.lock().expect("lock"), ["ZOOM E"]);
}

#[test]
fn given_lisp_when_dispatched_then_script_executed() {
    let (adapter, executor) = adapter_with(RecordingExecutor::default());

    let reply = adapter.dispatch(decode(r#"{"type":"lisp","message":"(+ 1 2)"}"#));

    assert!(reply.is_none());
    assert_eq!(*executor.scripts.lock().expect("lock"), ["(+ 1 2)"]);
}

#[test]
fn given_executor_failure_when_dispatched_then_error_reply() {
    let (adapter, _) = adapter_with(RecordingExecutor {
        fail_commands: true,
        ..RecordingExecutor::default()
    });

    let message = error_message(adapter.dispatch(Ok(Envelope::new(Payload::Execute {
        command: "REGEN".to_string(),
    }))));

    assert_eq!(message, "Failed to process command: no document open for REGEN");
}

#[test]
fn given_blank_command_when_dispatched_then_error_reply_and_no_execution() {
    let (adapter, executor) = adapter_with(RecordingExecutor::default());

    let message = error_message(adapter.dispatch(Ok(Envelope::new(Payload::Execute {
        command: "   ".to_string(),
    }))));

    assert!(message.starts_with("Failed to process command"));
    assert!(executor.commands.lock().expect("lock").is_empty());
}

/// **VALUE**: Verifies getvar/setvar/ping produce their reply kinds.
///
/// **BUG THIS CATCHES**: Would catch a reply carrying the request kind back, which
/// the external side would not recognize as an answer.
#[test]
fn given_variable_requests_and_ping_when_dispatched_then_typed_replies() {
    let (adapter, _) = adapter_with(RecordingExecutor::default());

    let set = adapter.dispatch(Ok(Envelope::new(Payload::SetVar {
        variable: "OSMODE".to_string(),
        value: json!(35),
    })));
    let get = adapter.dispatch(Ok(Envelope::new(Payload::GetVar {
        variable: "OSMODE".to_string(),
    })));
    let pong = adapter.dispatch(Ok(Envelope::new(Payload::Ping)));

    assert_eq!(
        set.map(|envelope| envelope.payload),
        Some(Payload::SysVarSet {
            variable: "OSMODE".to_string(),
            value: json!(35),
        })
    );
    assert_eq!(
        get.map(|envelope| envelope.payload),
        Some(Payload::SysVar {
            variable: "OSMODE".to_string(),
            value: json!(35),
        })
    );
    assert_eq!(pong.map(|envelope| envelope.payload), Some(Payload::Pong));
}

#[test]
fn given_unknown_variable_when_getvar_dispatched_then_error_names_variable() {
    let (adapter, _) = adapter_with(RecordingExecutor::default());

    let message = error_message(adapter.dispatch(Ok(Envelope::new(Payload::GetVar {
        variable: "NOSUCHVAR".to_string(),
    }))));

    assert_eq!(message, "Failed to get NOSUCHVAR: unknown variable NOSUCHVAR");
}

#[test]
fn given_malformed_record_when_dispatched_then_error_reply() {
    let (adapter, _) = adapter_with(RecordingExecutor::default());

    let message = error_message(adapter.dispatch(decode("{oops")));

    assert!(message.starts_with("Failed to process command: invalid JSON"), "{message}");
}

#[test]
fn given_host_only_or_unknown_kind_when_dispatched_then_unsupported_reply() {
    let (adapter, _) = adapter_with(RecordingExecutor::default());

    let host_kind = error_message(adapter.dispatch(Ok(Envelope::command_start("LINE"))));
    let unknown = error_message(adapter.dispatch(decode(r#"{"type":"teleport"}"#)));

    assert_eq!(host_kind, "Unsupported message type: command_start");
    assert_eq!(unknown, "Unsupported message type: teleport");
}
