use crate::sim::{SIMULATED_DOCUMENT, SimulatedHost, scenario};

use bridge_core::hooks::{HostEvent, HostExecutor};

use serde_json::{Value, json};

#[test]
fn given_seeded_host_when_reading_variables_then_case_insensitive() {
    let host = SimulatedHost::new("SimCAD 2025");

    assert_eq!(host.get_variable("osmode").expect("seeded"), json!(4133));
    assert_eq!(host.get_variable("CLAYER").expect("seeded"), json!("0"));
    assert_eq!(host.host_version().as_deref(), Some("SimCAD 2025"));
    assert_eq!(host.active_document().as_deref(), Some(SIMULATED_DOCUMENT));
}

#[test]
fn given_unknown_variable_when_read_then_reason_names_it() {
    let host = SimulatedHost::new("SimCAD 2025");

    let err = host.get_variable("NOPE").expect_err("not seeded");

    assert_eq!(err.reason(), "unknown variable NOPE");
}

#[test]
fn given_set_variable_when_read_back_then_new_value() {
    let host = SimulatedHost::new("SimCAD 2025");

    host.set_variable("osmode", &json!(511)).expect("set");

    assert_eq!(host.get_variable("OSMODE").expect("get"), json!(511));
    assert!(host.set_variable("OSMODE", &Value::Null).is_err());
}

#[test]
fn given_no_subscriber_when_executing_then_accepted_without_events() {
    let host = SimulatedHost::new("SimCAD 2025");

    assert!(host.execute_command("line 0,0 1,1").is_ok());
    assert!(!host.is_subscribed());
    assert!(!host.raise(HostEvent::ScriptEnded));
}

/// **VALUE**: Verifies every command the scenario starts is also finished.
///
/// **BUG THIS CATCHES**: Would catch a scenario edit that leaves a command in
/// flight forever, which would skew the monitor's history on every loop.
#[test]
fn given_scenario_when_replayed_then_every_start_is_closed() {
    let mut open: Vec<String> = Vec::new();

    for event in scenario().into_iter().flatten() {
        match event {
            HostEvent::CommandWillStart { command } => open.push(command),
            HostEvent::CommandEnded { command }
            | HostEvent::CommandCancelled { command }
            | HostEvent::CommandFailed { command, .. } => {
                let position = open
                    .iter()
                    .position(|c| *c == command)
                    .expect("finished command was started");
                open.remove(position);
            }
            _ => {}
        }
    }

    assert!(open.is_empty(), "left open: {open:?}");
}
