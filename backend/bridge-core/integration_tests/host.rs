use crate::helpers::{
    FakeEventSource, FakeExecutor, WAIT, dialer_options, listener_options, unique_channel,
};

use bridge_core::hooks::{BridgeHost, HostEvent};
use bridge_core::monitor::{BridgeMonitor, LinkStatus};

use models::{CommandStatus, Envelope, Payload};

use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Next envelope from the monitor that satisfies `accept`.
async fn next_matching(
    envelopes: &mut broadcast::Receiver<Envelope>,
    accept: impl Fn(&Envelope) -> bool,
) -> Envelope {
    tokio::time::timeout(WAIT, async {
        loop {
            let envelope = envelopes.recv().await.expect("envelope stream open");
            if accept(&envelope) {
                return envelope;
            }
        }
    })
    .await
    .expect("timed out waiting for envelope")
}

struct Session {
    host: BridgeHost,
    monitor: BridgeMonitor,
    source: Arc<FakeEventSource>,
    executor: Arc<FakeExecutor>,
    envelopes: broadcast::Receiver<Envelope>,
}

async fn connected_session(prefix: &str) -> Session {
    let cancel = CancellationToken::new();
    let name = unique_channel(prefix);
    let source = Arc::new(FakeEventSource::default());
    let executor = Arc::new(FakeExecutor::default());

    let host = BridgeHost::start_with(
        listener_options(&name),
        source.clone(),
        executor.clone(),
        &cancel,
    );
    let monitor = BridgeMonitor::start_with(dialer_options(&name), 100, &cancel);
    let envelopes = monitor.subscribe_envelopes();

    monitor.connect().await.expect("monitor connects");
    source.wait_until_subscribed().await;

    Session {
        host,
        monitor,
        source,
        executor,
        envelopes,
    }
}

/// **VALUE**: Verifies the whole path from a host event to session statistics.
///
/// **WHY THIS MATTERS**: This is the product: host lifecycle callbacks on one side,
/// correlated command history on the other.
///
/// **BUG THIS CATCHES**: Would catch a broken link anywhere in adapter → codec →
/// listener → dialer → engine.
#[tokio::test]
async fn given_connected_session_when_host_emits_events_then_monitor_correlates() {
    let mut session = connected_session("events").await;

    assert!(session.source.emit(HostEvent::CommandWillStart {
        command: "LINE".to_string()
    }));
    assert!(session.source.emit(HostEvent::CommandEnded {
        command: "LINE".to_string()
    }));
    assert!(session.source.emit(HostEvent::CommandWillStart {
        command: "CIRCLE".to_string()
    }));
    assert!(session.source.emit(HostEvent::CommandFailed {
        command: "CIRCLE".to_string(),
        error: Some("bad argument type: numberp nil".to_string()),
    }));

    next_matching(&mut session.envelopes, |envelope| {
        matches!(envelope.payload, Payload::CommandFailed { .. })
    })
    .await;

    let export = session.monitor.statistics().export().await;
    assert_eq!(export.command_count, 2);
    assert_eq!(export.error_count, 1);
    assert_eq!(export.error_rate, 50.0);
    assert_eq!(export.error_patterns.get("Bad argument type"), Some(&1));
    let statuses: Vec<_> = export
        .command_history
        .iter()
        .map(|item| item.status)
        .collect();
    assert_eq!(statuses, [CommandStatus::Completed, CommandStatus::Failed]);
    assert!(matches!(
        session.monitor.link_status().await,
        LinkStatus::HostReportedFailure { .. }
    ));

    session.monitor.shutdown().await;
    session.host.shutdown().await;
}

#[tokio::test]
async fn given_connected_session_when_requests_sent_then_host_replies() {
    let mut session = connected_session("requests").await;
    let dialer = session.monitor.dialer().clone();

    dialer
        .set_variable("OSMODE", json!(511))
        .await
        .expect("setvar");
    let set = next_matching(&mut session.envelopes, |e| {
        matches!(e.payload, Payload::SysVarSet { .. })
    })
    .await;

    dialer.get_variable("OSMODE").await.expect("getvar");
    let got = next_matching(&mut session.envelopes, |e| {
        matches!(e.payload, Payload::SysVar { .. })
    })
    .await;

    dialer.ping().await.expect("ping");
    next_matching(&mut session.envelopes, |e| e.payload == Payload::Pong).await;

    dialer.get_variable("MISSING").await.expect("getvar");
    let missing = next_matching(&mut session.envelopes, |e| {
        matches!(e.payload, Payload::Error { .. })
    })
    .await;

    dialer.send_command("REGEN").await.expect("execute");
    dialer.ping().await.expect("ping");
    next_matching(&mut session.envelopes, |e| e.payload == Payload::Pong).await;

    assert_eq!(
        set.payload,
        Payload::SysVarSet {
            variable: "OSMODE".to_string(),
            value: json!(511),
        }
    );
    assert_eq!(
        got.payload,
        Payload::SysVar {
            variable: "OSMODE".to_string(),
            value: json!(511),
        }
    );
    assert_eq!(
        missing.payload,
        Payload::Error {
            message: "Failed to get MISSING: unknown variable MISSING".to_string()
        }
    );
    assert_eq!(*session.executor.commands.lock().expect("lock"), ["REGEN"]);

    session.monitor.shutdown().await;
    session.host.shutdown().await;
}

#[tokio::test]
async fn given_connected_session_when_send_test_then_drawing_reported() {
    let mut session = connected_session("test-message").await;

    session
        .host
        .send_test("hello from host")
        .await
        .expect("send test");

    let test = next_matching(&mut session.envelopes, |e| {
        matches!(e.payload, Payload::Test { .. })
    })
    .await;
    assert_eq!(
        test.payload,
        Payload::Test {
            message: Some("hello from host".to_string()),
            drawing: Some("Drawing1.dwg".to_string()),
        }
    );

    session.monitor.shutdown().await;
    session.host.shutdown().await;
}

/// **VALUE**: Verifies host hooks are held only while a peer is connected, with
/// subscribe and unsubscribe always paired.
///
/// **BUG THIS CATCHES**: Would catch a leaked subscription after disconnect, or a
/// second subscribe stacking duplicate handlers on reconnect.
#[tokio::test]
async fn given_peer_reconnects_when_session_ends_then_subscriptions_paired() {
    let session = connected_session("pairing").await;
    let dialer = session.monitor.dialer().clone();

    dialer.disconnect().await;
    session.source.wait_until_unsubscribed().await;
    assert!(!session.source.emit(HostEvent::ScriptEnded));

    dialer.connect().await.expect("reconnect");
    session.source.wait_until_subscribed().await;

    session.monitor.shutdown().await;
    session.host.shutdown().await;

    assert!(!session.source.is_subscribed());
    assert_eq!(session.source.subscribes.load(Ordering::SeqCst), 2);
    assert_eq!(session.source.unsubscribes.load(Ordering::SeqCst), 2);
}

/// **VALUE**: Verifies a peer that leaves and comes straight back gets a fresh
/// subscription and none of the previous connection's script state.
///
/// **WHY THIS MATTERS**: The host can accept the new peer before the adapter
/// notices the old one left. Both moments read as "connected", so only the
/// connection identifier tells them apart.
///
/// **BUG THIS CATCHES**: Would catch the adapter skipping the resubscribe on a
/// fast reconnect, which leaves the first script's name stamped onto a
/// `lisp_end` sent to the second peer.
#[tokio::test]
async fn given_fast_reconnect_when_script_ends_then_previous_script_forgotten() {
    let mut session = connected_session("fast-reconnect").await;
    let dialer = session.monitor.dialer().clone();

    assert!(session.source.emit(HostEvent::ScriptWillStart {
        first_line: Some("(old-script)".to_string()),
    }));
    next_matching(&mut session.envelopes, |e| {
        matches!(e.payload, Payload::ScriptStart { .. })
    })
    .await;

    dialer.disconnect().await;
    dialer.connect().await.expect("reconnect");
    session.source.wait_for_subscribes(2).await;

    assert!(session.source.emit(HostEvent::ScriptEnded));
    let ended = next_matching(&mut session.envelopes, |e| {
        matches!(e.payload, Payload::ScriptEnd { .. })
    })
    .await;

    assert_eq!(
        ended.payload,
        Payload::ScriptEnd {
            first_expression: None
        }
    );
    assert_eq!(session.source.unsubscribes.load(Ordering::SeqCst), 1);
    assert!(session.source.is_subscribed());

    session.monitor.shutdown().await;
    session.host.shutdown().await;

    assert_eq!(session.source.subscribes.load(Ordering::SeqCst), 2);
    assert_eq!(session.source.unsubscribes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn given_reconnect_when_new_session_starts_then_statistics_reset() {
    let mut session = connected_session("reset").await;
    let dialer = session.monitor.dialer().clone();

    session.source.emit(HostEvent::CommandWillStart {
        command: "MOVE".to_string(),
    });
    next_matching(&mut session.envelopes, |e| e.identifier() == Some("MOVE")).await;
    assert_eq!(session.monitor.statistics().statistics().await.command_count, 1);

    dialer.disconnect().await;
    session.source.wait_until_unsubscribed().await;
    dialer.connect().await.expect("reconnect");
    next_matching(&mut session.envelopes, |e| {
        matches!(e.payload, Payload::Connected { .. })
    })
    .await;

    assert_eq!(session.monitor.statistics().statistics().await.command_count, 0);

    session.monitor.shutdown().await;
    session.host.shutdown().await;
}
