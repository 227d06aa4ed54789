use crate::MessageKind;

#[test]
fn given_canonical_wire_names_when_parsed_then_round_trip_through_as_str() {
    let all = [
        MessageKind::Connected,
        MessageKind::Shutdown,
        MessageKind::CommandStart,
        MessageKind::CommandEnd,
        MessageKind::CommandCancelled,
        MessageKind::CommandFailed,
        MessageKind::ScriptStart,
        MessageKind::ScriptEnd,
        MessageKind::ScriptCancelled,
        MessageKind::PromptString,
        MessageKind::PromptPoint,
        MessageKind::PromptSelection,
        MessageKind::Error,
        MessageKind::Test,
        MessageKind::SysVar,
        MessageKind::SysVarSet,
        MessageKind::Pong,
        MessageKind::Execute,
        MessageKind::RunScript,
        MessageKind::GetVar,
        MessageKind::SetVar,
        MessageKind::Ping,
    ];

    for kind in all {
        assert_eq!(MessageKind::parse(kind.as_str()), Some(kind), "{kind}");
    }
}

/// **VALUE**: Verifies the `script_*` / `run_script` spellings resolve to the same kinds
/// as the legacy `lisp_*` / `lisp` names.
///
/// **BUG THIS CATCHES**: Would catch a dropped serde alias, which would turn script
/// traffic from newer peers into `Unknown` envelopes.
#[test]
fn given_script_aliases_when_parsed_then_map_to_script_kinds() {
    assert_eq!(MessageKind::parse("script_start"), Some(MessageKind::ScriptStart));
    assert_eq!(MessageKind::parse("script_end"), Some(MessageKind::ScriptEnd));
    assert_eq!(
        MessageKind::parse("script_cancelled"),
        Some(MessageKind::ScriptCancelled)
    );
    assert_eq!(MessageKind::parse("run_script"), Some(MessageKind::RunScript));
    assert_eq!(MessageKind::RunScript.as_str(), "lisp");
}

#[test]
fn given_unknown_name_when_parsed_then_returns_none() {
    assert_eq!(MessageKind::parse("layout_generated"), None);
    assert_eq!(MessageKind::parse(""), None);
    assert_eq!(MessageKind::parse("CommandStart"), None);
}

#[test]
fn given_control_kinds_when_classified_then_only_external_requests_are_control() {
    assert!(MessageKind::Execute.is_control());
    assert!(MessageKind::Ping.is_control());
    assert!(!MessageKind::Pong.is_control());
    assert!(!MessageKind::CommandStart.is_control());
}
