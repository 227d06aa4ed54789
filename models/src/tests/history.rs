use crate::{CommandHistoryItem, CommandStatus, MessageKind};

use chrono::{Duration, TimeZone, Utc};

/// **VALUE**: Verifies a history item can only reach a terminal status once.
///
/// **WHY THIS MATTERS**: A late duplicate `command_end` or a `command_cancelled` after a
/// `command_failed` must not rewrite the recorded outcome or its duration.
///
/// **BUG THIS CATCHES**: Would catch `finish()` overwriting an already terminal item.
#[test]
fn given_finished_item_when_finished_again_then_first_outcome_is_kept() {
    // GIVEN
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let mut item = CommandHistoryItem::started("LINE", MessageKind::CommandStart, start);

    // WHEN
    let first = item.finish(
        CommandStatus::Failed,
        start + Duration::milliseconds(250),
        Some("bad argument type".to_string()),
    );
    let second = item.finish(
        CommandStatus::Completed,
        start + Duration::milliseconds(900),
        None,
    );

    // THEN
    assert!(first);
    assert!(!second);
    assert_eq!(item.status, CommandStatus::Failed);
    assert_eq!(item.duration_ms, Some(250.0));
    assert_eq!(item.error.as_deref(), Some("bad argument type"));
}

#[test]
fn given_in_progress_item_when_queried_then_has_no_duration() {
    let item = CommandHistoryItem::started("ZOOM", MessageKind::CommandStart, Utc::now());

    assert_eq!(item.status, CommandStatus::InProgress);
    assert!(item.duration().is_none());
    assert!(item.duration_ms.is_none());
}

#[test]
fn given_in_progress_target_when_finishing_then_is_rejected() {
    let mut item = CommandHistoryItem::started("PAN", MessageKind::CommandStart, Utc::now());

    assert!(!item.finish(CommandStatus::InProgress, Utc::now(), None));
    assert!(item.end_time.is_none());
}

#[test]
fn given_finished_item_when_serialized_then_uses_snake_case_status() {
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let mut item = CommandHistoryItem::started("MOVE", MessageKind::CommandStart, start);
    item.finish(CommandStatus::Cancelled, start + Duration::seconds(2), None);

    let json = serde_json::to_value(&item).expect("serializable");

    assert_eq!(json["status"], "cancelled");
    assert_eq!(json["kind"], "command_start");
    assert_eq!(json["duration_ms"], 2000.0);
    assert!(json.get("error").is_none());
}
