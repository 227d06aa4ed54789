// Unit tests for the statistics engine
// Every test drives time explicitly through envelope timestamps and `_at` calls

use crate::stats::StatisticsEngine;
use crate::stats::engine::UNKNOWN_IDENTIFIER;

use models::{CommandStatus, Envelope, MessageKind, Payload};

use chrono::{DateTime, Duration, TimeZone, Utc};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0)
        .single()
        .expect("valid fixed timestamp")
}

fn at(offset_ms: i64, payload: Payload) -> Envelope {
    Envelope::at(payload, t0() + Duration::milliseconds(offset_ms))
}

fn start(offset_ms: i64, command: &str) -> Envelope {
    at(
        offset_ms,
        Payload::CommandStart {
            command: command.to_string(),
        },
    )
}

fn end(offset_ms: i64, command: &str) -> Envelope {
    at(
        offset_ms,
        Payload::CommandEnd {
            command: command.to_string(),
        },
    )
}

fn failed(offset_ms: i64, command: &str, error: Option<&str>) -> Envelope {
    at(
        offset_ms,
        Payload::CommandFailed {
            command: command.to_string(),
            error: error.map(str::to_string),
        },
    )
}

// ============================================
// CORRELATION
// ============================================

/// **VALUE**: Verifies a start/end pair becomes one completed item with its duration.
///
/// **BUG THIS CATCHES**: Would catch end events not finding their in-flight item, or
/// duration being measured from the wrong timestamps.
#[test]
fn given_line_start_and_end_120ms_apart_when_applied_then_completed_with_duration() {
    let mut engine = StatisticsEngine::starting_at(1000, t0());

    assert!(engine.apply(&start(0, "LINE")));
    assert!(engine.apply(&end(120, "LINE")));

    let export = engine.export_at(t0() + Duration::seconds(1));
    assert_eq!(export.command_count, 1);
    assert_eq!(export.error_count, 0);
    assert_eq!(export.command_history.len(), 1);

    let item = &export.command_history[0];
    assert_eq!(item.command, "LINE");
    assert_eq!(item.kind, MessageKind::CommandStart);
    assert_eq!(item.status, CommandStatus::Completed);
    assert_eq!(item.duration_ms, Some(120.0));
    assert_eq!(export.average_duration_ms, 120.0);
    assert_eq!(engine.in_flight_count(), 0);
}

/// **VALUE**: Verifies a failure is counted once and bucketed by its error text.
///
/// **BUG THIS CATCHES**: Would catch double counting a `command_failed` as both a
/// terminal event and a separate error.
#[test]
fn given_circle_failure_when_applied_then_failed_and_bad_argument_bucket() {
    let mut engine = StatisticsEngine::starting_at(1000, t0());

    engine.apply(&start(0, "CIRCLE"));
    engine.apply(&failed(40, "CIRCLE", Some("bad argument type: numberp nil")));

    let export = engine.export_at(t0() + Duration::seconds(1));
    assert_eq!(export.error_count, 1);
    assert_eq!(export.error_patterns.get("Bad argument type"), Some(&1));
    assert_eq!(export.error_patterns.len(), 1);

    let item = &export.command_history[0];
    assert_eq!(item.status, CommandStatus::Failed);
    assert_eq!(item.error.as_deref(), Some("bad argument type: numberp nil"));
}

#[test]
fn given_ten_commands_with_one_failure_when_exported_then_error_rate_is_ten() {
    let mut engine = StatisticsEngine::starting_at(1000, t0());

    for i in 0..9 {
        let name = format!("CMD{i}");
        engine.apply(&start(i * 100, &name));
        engine.apply(&end(i * 100 + 50, &name));
    }
    engine.apply(&start(1000, "ERASE"));
    engine.apply(&failed(1010, "ERASE", Some("Invalid selection")));

    let statistics = engine.statistics_at(t0() + Duration::minutes(1));
    assert_eq!(statistics.command_count, 10);
    assert_eq!(statistics.error_count, 1);
    assert_eq!(statistics.error_rate, 10.0);
    assert_eq!(statistics.commands_per_minute, 10.0);
}

#[test]
fn given_failure_without_text_when_applied_then_default_text_recorded() {
    let mut engine = StatisticsEngine::starting_at(1000, t0());

    engine.apply(&start(0, "PAN"));
    engine.apply(&failed(10, "PAN", None));

    let item = engine.history().next().expect("one item");
    assert_eq!(item.error.as_deref(), Some("Command failed"));
    assert_eq!(engine.error_patterns().get("other"), Some(&1));
}

#[test]
fn given_bare_error_when_applied_then_counted_without_history() {
    let mut engine = StatisticsEngine::starting_at(1000, t0());

    engine.apply(&at(
        0,
        Payload::Error {
            message: "too few arguments".to_string(),
        },
    ));

    let statistics = engine.statistics_at(t0());
    assert_eq!(statistics.error_count, 1);
    assert_eq!(statistics.command_count, 0);
    assert_eq!(statistics.error_rate, 0.0);
    assert_eq!(engine.error_patterns().get("Too few arguments"), Some(&1));
    assert_eq!(engine.history().count(), 0);
}

/// **VALUE**: Verifies an end with no matching start only touches statistics.
///
/// **WHY THIS MATTERS**: After a reconnect the first events are often the tail of a
/// command that started before the link came up.
#[test]
fn given_unmatched_end_events_when_applied_then_no_history_entry_created() {
    let mut engine = StatisticsEngine::starting_at(1000, t0());

    engine.apply(&end(0, "ZOOM"));
    engine.apply(&failed(5, "MOVE", Some("Object not found")));

    let export = engine.export_at(t0());
    assert!(export.command_history.is_empty());
    assert_eq!(export.command_count, 0);
    assert_eq!(export.error_count, 1);
    assert_eq!(export.error_patterns.get("Object not found"), Some(&1));
    assert_eq!(export.average_duration_ms, 0.0);
}

/// **VALUE**: Verifies last-start-wins for duplicate in-flight identifiers.
///
/// **BUG THIS CATCHES**: Would catch the end event completing the older invocation,
/// or the older invocation being silently removed from history.
#[test]
fn given_duplicate_start_when_end_arrives_then_latest_invocation_completes() {
    let mut engine = StatisticsEngine::starting_at(1000, t0());

    engine.apply(&start(0, "COPY"));
    engine.apply(&start(100, "COPY"));
    engine.apply(&end(130, "COPY"));

    let history: Vec<_> = engine.history().cloned().collect();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, CommandStatus::InProgress);
    assert_eq!(history[1].status, CommandStatus::Completed);
    assert_eq!(history[1].duration_ms, Some(30.0));
    assert_eq!(engine.statistics_at(t0()).command_count, 2);
}

#[test]
fn given_script_events_without_expression_when_applied_then_correlated_as_unknown() {
    let mut engine = StatisticsEngine::starting_at(1000, t0());

    engine.apply(&at(
        0,
        Payload::ScriptStart {
            first_expression: None,
        },
    ));
    engine.apply(&at(
        25,
        Payload::ScriptCancelled {
            first_expression: None,
        },
    ));

    let item = engine.history().next().expect("one item");
    assert_eq!(item.command, UNKNOWN_IDENTIFIER);
    assert_eq!(item.kind, MessageKind::ScriptStart);
    assert_eq!(item.status, CommandStatus::Cancelled);
}

#[test]
fn given_non_statistics_envelopes_when_applied_then_reports_no_change() {
    let mut engine = StatisticsEngine::starting_at(1000, t0());

    assert!(!engine.apply(&at(0, Payload::Pong)));
    assert!(!engine.apply(&at(
        0,
        Payload::PromptPoint {
            message: Some("Specify first point".to_string())
        }
    )));
    assert_eq!(engine.statistics_at(t0()).command_count, 0);
}

// ============================================
// HISTORY BOUND
// ============================================

/// **VALUE**: Verifies the history cap evicts oldest first and that an evicted
/// in-flight command still contributes its duration when it ends.
///
/// **BUG THIS CATCHES**: Would catch index drift after eviction, where an end event
/// completes the wrong history item.
#[test]
fn given_history_cap_when_exceeded_then_oldest_evicted_and_correlation_intact() {
    let mut engine = StatisticsEngine::starting_at(2, t0());

    engine.apply(&start(0, "A"));
    engine.apply(&start(10, "B"));
    engine.apply(&start(20, "C"));

    let names: Vec<_> = engine.history().map(|item| item.command.clone()).collect();
    assert_eq!(names, ["B", "C"]);

    engine.apply(&end(100, "A"));
    engine.apply(&end(60, "C"));

    let history: Vec<_> = engine.history().cloned().collect();
    assert_eq!(history[0].status, CommandStatus::InProgress);
    assert_eq!(history[1].status, CommandStatus::Completed);
    assert_eq!(history[1].duration_ms, Some(40.0));

    // A: 100 ms, C: 40 ms
    assert_eq!(engine.statistics_at(t0()).average_duration_ms, 70.0);
}

#[test]
fn given_end_before_start_timestamp_when_applied_then_average_clamped_to_zero() {
    let mut engine = StatisticsEngine::starting_at(1000, t0());

    engine.apply(&start(500, "REGEN"));
    engine.apply(&end(400, "REGEN"));

    assert_eq!(engine.statistics_at(t0()).average_duration_ms, 0.0);
}

// ============================================
// RESET AND EXPORT
// ============================================

/// **VALUE**: Verifies reset after export leaves a clean session and does not
/// disturb the export already taken.
///
/// **BUG THIS CATCHES**: Would catch the export sharing storage with the live engine.
#[test]
fn given_populated_session_when_reset_after_export_then_fresh_and_export_intact() {
    let mut engine = StatisticsEngine::starting_at(1000, t0());
    engine.apply(&start(0, "LINE"));
    engine.apply(&failed(10, "LINE", Some("syntax error")));

    let before_reset = engine.export_at(t0() + Duration::seconds(5));
    let reset_time = t0() + Duration::seconds(10);
    engine.reset_at(reset_time);
    let after_reset = engine.export_at(reset_time);

    assert_eq!(before_reset.command_count, 1);
    assert_eq!(before_reset.command_history.len(), 1);

    assert_eq!(after_reset.command_count, 0);
    assert_eq!(after_reset.error_count, 0);
    assert!(after_reset.command_history.is_empty());
    assert!(after_reset.error_patterns.is_empty());
    assert!(after_reset.session_start >= reset_time);
    assert_eq!(engine.in_flight_count(), 0);
}

#[test]
fn given_empty_session_when_statistics_taken_then_rates_are_zero() {
    let engine = StatisticsEngine::starting_at(1000, t0());

    let statistics = engine.statistics_at(t0());
    assert_eq!(statistics.error_rate, 0.0);
    assert_eq!(statistics.average_duration_ms, 0.0);
    assert_eq!(statistics.commands_per_minute, 0.0);
    assert_eq!(statistics.session_duration_ms, 0);
}

#[test]
fn given_export_when_serialized_then_report_fields_present() {
    let mut engine = StatisticsEngine::starting_at(1000, t0());
    engine.apply(&start(0, "LINE"));
    engine.apply(&end(120, "LINE"));

    let json = engine
        .export_at(t0() + Duration::seconds(30))
        .to_json_pretty()
        .expect("export serializes");
    let value: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");

    for field in [
        "session_start",
        "session_end",
        "command_count",
        "error_count",
        "error_rate",
        "average_duration_ms",
        "commands_per_minute",
        "error_patterns",
        "command_history",
    ] {
        assert!(value.get(field).is_some(), "missing {field}");
    }
    assert_eq!(value["command_history"][0]["status"], "completed");
}
