use crate::helpers::{
    WAIT, dialer_options, listener_options, next_envelope, next_inbound, unique_channel,
};

use bridge_core::BRIDGE_PROTOCOL_VERSION;
use bridge_core::transport::{Dialer, DialerState, Listener, ListenerState, RetryPolicy};

use models::{Envelope, Payload};

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

// ============================================================================
// Listener ↔ Dialer over a real local channel
// ============================================================================

/// **VALUE**: Verifies the listener greets each peer with the handshake and goes back
/// to listening by itself when the peer leaves.
///
/// **WHY THIS MATTERS**: The host side runs unattended inside the host application.
/// If it stopped listening after the first disconnect, every later monitor session
/// would fail until the host restarted.
///
/// **BUG THIS CATCHES**: Would catch:
/// - handshake sent only on the first connection
/// - accept loop exiting on peer close
/// - state left at `Connected` after the peer is gone
#[tokio::test]
async fn given_listener_when_peer_reconnects_then_handshake_resent() {
    let cancel = CancellationToken::new();
    let name = unique_channel("relisten");
    let (listener, _host_inbound) = Listener::start(listener_options(&name), &cancel);
    let mut listener_state = listener.subscribe_state();
    let (dialer, mut inbound) = Dialer::new(dialer_options(&name), &cancel);

    for round in 0..2 {
        dialer.connect().await.expect("connect");

        let handshake = next_envelope(&mut inbound).await;
        assert_eq!(
            handshake.payload,
            Payload::Connected {
                version: BRIDGE_PROTOCOL_VERSION.to_string(),
                host_version: Some("test-host 1.0".to_string()),
            },
            "round {round}"
        );
        tokio::time::timeout(WAIT, listener_state.wait_for(|s| *s == ListenerState::Connected))
            .await
            .expect("listener connected in time")
            .expect("listener alive");

        dialer.disconnect().await;
        tokio::time::timeout(WAIT, listener_state.wait_for(|s| *s == ListenerState::Listening))
            .await
            .expect("listener re-listening in time")
            .expect("listener alive");
    }

    listener.shutdown().await;
    assert_eq!(listener.state(), ListenerState::Stopped);
}

#[tokio::test]
async fn given_absent_listener_when_connect_with_one_second_timeout_then_unavailable() {
    let cancel = CancellationToken::new();
    let mut options = dialer_options(&unique_channel("absent"));
    options.connect_timeout = Duration::from_secs(1);
    let (dialer, _inbound) = Dialer::new(options, &cancel);
    let started = Instant::now();

    let error = dialer.connect().await.expect_err("nothing listens");

    let elapsed = started.elapsed();
    assert!(error.is_unavailable(), "{error}");
    assert!(elapsed >= Duration::from_millis(900), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
    assert_eq!(dialer.state(), DialerState::Disconnected);
}

#[tokio::test]
async fn given_cancelled_token_when_connecting_then_unavailable_promptly() {
    let cancel = CancellationToken::new();
    let (dialer, _inbound) = Dialer::new(dialer_options(&unique_channel("cancel")), &cancel);
    let started = Instant::now();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });
    let error = dialer.connect().await.expect_err("cancelled");

    assert!(error.is_unavailable(), "{error}");
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn given_no_peer_when_sending_then_not_connected() {
    let cancel = CancellationToken::new();
    let name = unique_channel("not-connected");
    let (listener, _host_inbound) = Listener::start(listener_options(&name), &cancel);
    let (dialer, _inbound) = Dialer::new(dialer_options(&name), &cancel);

    let from_host = listener
        .send(&Envelope::command_start("LINE"))
        .await
        .expect_err("no peer");
    let from_external = Dialer::new(dialer_options(&unique_channel("idle")), &cancel)
        .0
        .ping()
        .await
        .expect_err("never connected");

    assert!(from_host.is_not_connected(), "{from_host}");
    assert!(from_external.is_not_connected(), "{from_external}");
    assert_eq!(dialer.state(), DialerState::Disconnected);

    listener.shutdown().await;
}

/// **VALUE**: Verifies a host shutdown reaches the peer as a `shutdown` envelope and
/// then as a clean disconnect.
///
/// **BUG THIS CATCHES**: Would catch cancellation racing ahead of the final write, so
/// the peer sees a bare disconnect with no reason.
#[tokio::test]
async fn given_connected_peer_when_listener_shuts_down_then_peer_notified() {
    let cancel = CancellationToken::new();
    let name = unique_channel("shutdown");
    let (listener, _host_inbound) = Listener::start(listener_options(&name), &cancel);
    let (dialer, mut inbound) = Dialer::new(dialer_options(&name), &cancel);
    let mut dialer_state = dialer.subscribe_state();

    dialer.connect().await.expect("connect");
    next_envelope(&mut inbound).await;

    listener.shutdown().await;

    assert_eq!(next_envelope(&mut inbound).await.payload, Payload::Shutdown);
    tokio::time::timeout(WAIT, dialer_state.wait_for(|s| *s == DialerState::Disconnected))
        .await
        .expect("dialer disconnected in time")
        .expect("dialer alive");
}

/// **VALUE**: Verifies the `shutdown` notice also goes out when the listener is
/// stopped through its parent cancellation token.
///
/// **WHY THIS MATTERS**: On Ctrl-C the binary cancels the root token first and
/// calls `shutdown()` afterwards. The accept loop sees the cancellation before
/// `shutdown()` runs.
///
/// **BUG THIS CATCHES**: Would catch the accept loop dropping the connection on
/// cancellation without the notice, so the peer sees a bare disconnect.
#[tokio::test]
async fn given_connected_peer_when_parent_token_cancelled_then_peer_notified() {
    let host_cancel = CancellationToken::new();
    let peer_cancel = CancellationToken::new();
    let name = unique_channel("parent-cancel");
    let (listener, _host_inbound) = Listener::start(listener_options(&name), &host_cancel);
    let (dialer, mut inbound) = Dialer::new(dialer_options(&name), &peer_cancel);
    let mut dialer_state = dialer.subscribe_state();

    dialer.connect().await.expect("connect");
    next_envelope(&mut inbound).await;

    host_cancel.cancel();

    assert_eq!(next_envelope(&mut inbound).await.payload, Payload::Shutdown);
    tokio::time::timeout(WAIT, dialer_state.wait_for(|s| *s == DialerState::Disconnected))
        .await
        .expect("dialer disconnected in time")
        .expect("dialer alive");

    listener.shutdown().await;
    assert_eq!(listener.state(), ListenerState::Stopped);
}

#[tokio::test]
async fn given_both_sides_connected_when_exchanging_then_order_preserved() {
    let cancel = CancellationToken::new();
    let name = unique_channel("order");
    let (listener, mut host_inbound) = Listener::start(listener_options(&name), &cancel);
    let (dialer, mut inbound) = Dialer::new(dialer_options(&name), &cancel);

    dialer.connect().await.expect("connect");
    next_envelope(&mut inbound).await;

    for command in ["LINE", "CIRCLE", "ZOOM"] {
        dialer.send_command(command).await.expect("send");
    }
    for command in ["LINE", "CIRCLE", "ZOOM"] {
        assert_eq!(
            next_envelope(&mut host_inbound).await.payload,
            Payload::Execute {
                command: command.to_string()
            }
        );
    }

    listener
        .send(&Envelope::command_start("COPY"))
        .await
        .expect("host send");
    assert_eq!(
        next_envelope(&mut inbound).await.identifier(),
        Some("COPY")
    );

    dialer.disconnect().await;
    listener.shutdown().await;
}

/// **VALUE**: Verifies records still queued from a dropped connection are not
/// handed out after the dialer reconnects.
///
/// **WHY THIS MATTERS**: The monitor resets its statistics when a new
/// connection starts. Anything from the old connection read after that point
/// would be counted in the new session.
///
/// **BUG THIS CATCHES**: Would catch the shared inbound sequence replaying the
/// old connection's backlog ahead of the new handshake.
#[tokio::test]
async fn given_unread_records_when_dialer_reconnects_then_backlog_skipped() {
    let cancel = CancellationToken::new();
    let name = unique_channel("backlog");
    let (listener, _host_inbound) = Listener::start(listener_options(&name), &cancel);
    let mut connection = listener.subscribe_connection();
    let (dialer, mut inbound) = Dialer::new(dialer_options(&name), &cancel);

    dialer.connect().await.expect("connect");
    tokio::time::timeout(WAIT, connection.wait_for(|id| *id == Some(1)))
        .await
        .expect("listener connected in time")
        .expect("listener alive");
    for command in ["LINE", "CIRCLE"] {
        listener
            .send(&Envelope::command_start(command))
            .await
            .expect("host send");
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    dialer.disconnect().await;
    dialer.connect().await.expect("reconnect");
    tokio::time::timeout(WAIT, connection.wait_for(|id| *id == Some(2)))
        .await
        .expect("listener reconnected in time")
        .expect("listener alive");
    listener
        .send(&Envelope::command_start("ZOOM"))
        .await
        .expect("host send");

    assert!(matches!(
        next_envelope(&mut inbound).await.payload,
        Payload::Connected { .. }
    ));
    assert_eq!(next_envelope(&mut inbound).await.identifier(), Some("ZOOM"));

    dialer.disconnect().await;
    listener.shutdown().await;
}

// ============================================================================
// Raw peers (Unix domain socket)
// ============================================================================

/// **VALUE**: Verifies a malformed record is surfaced and skipped without dropping
/// the connection.
///
/// **WHY THIS MATTERS**: One bad line from a buggy or newer peer must not cost the
/// whole session.
#[cfg(unix)]
#[tokio::test]
async fn given_malformed_line_when_read_then_skipped_and_connection_kept() {
    use bridge_core::transport::channel_address;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixStream;

    let cancel = CancellationToken::new();
    let name = unique_channel("malformed");
    let (listener, mut host_inbound) = Listener::start(listener_options(&name), &cancel);
    let mut listener_state = listener.subscribe_state();

    let mut peer = tokio::time::timeout(WAIT, async {
        loop {
            match UnixStream::connect(channel_address(&name)).await {
                Ok(stream) => break stream,
                Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
    })
    .await
    .expect("listener bound in time");

    peer.write_all(b"this is not json\n\n{\"type\":\"ping\"}\n")
        .await
        .expect("write");

    let first = next_inbound(&mut host_inbound).await;
    assert!(first.expect_err("malformed").is_malformed());
    assert_eq!(next_envelope(&mut host_inbound).await.payload, Payload::Ping);

    tokio::time::timeout(WAIT, listener_state.wait_for(|s| *s == ListenerState::Connected))
        .await
        .expect("still connected")
        .expect("listener alive");

    listener.shutdown().await;
}

/// **VALUE**: Verifies only one peer is served at a time.
///
/// **BUG THIS CATCHES**: Would catch the listening socket staying bound while a peer
/// is attached, which would leave a second peer connected but never served.
#[cfg(unix)]
#[tokio::test]
async fn given_connected_peer_when_second_peer_dials_then_refused() {
    use bridge_core::transport::channel_address;
    use tokio::net::UnixStream;

    let cancel = CancellationToken::new();
    let name = unique_channel("single-peer");
    let (listener, _host_inbound) = Listener::start(listener_options(&name), &cancel);
    let (dialer, mut inbound) = Dialer::new(dialer_options(&name), &cancel);

    dialer.connect().await.expect("first peer connects");
    next_envelope(&mut inbound).await;

    let second = UnixStream::connect(channel_address(&name)).await;

    assert!(second.is_err(), "second peer should be refused");

    dialer.disconnect().await;
    listener.shutdown().await;
}

/// **VALUE**: Verifies the listener waits out its retry delay after a failed
/// accept and then serves peers again.
///
/// **WHY THIS MATTERS**: A socket path the listener cannot reclaim would
/// otherwise spin the accept loop as fast as it can fail, inside the host
/// application's process.
///
/// **BUG THIS CATCHES**: Would catch:
/// - retrying immediately after an accept failure
/// - the accept loop giving up after the first failure
/// - the listener never reaching `Listening` again once the path is usable
#[cfg(unix)]
#[tokio::test]
async fn given_accept_failure_when_listening_then_retries_after_delay() {
    use bridge_core::transport::channel_address;

    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let cancel = CancellationToken::new();
    let name = unique_channel("accept-retry");
    let blocker = channel_address(&name);
    // A non-empty directory cannot be unlinked as a stale socket.
    std::fs::create_dir_all(blocker.join("occupied")).expect("blocking directory");

    let mut options = listener_options(&name);
    options.retry = RetryPolicy::fixed(RETRY_DELAY);
    let (listener, _host_inbound) = Listener::start(options, &cancel);
    let mut listener_state = listener.subscribe_state();

    tokio::time::timeout(WAIT, listener_state.wait_for(|s| *s == ListenerState::Listening))
        .await
        .expect("first accept attempt in time")
        .expect("listener alive");
    let first_attempt = Instant::now();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let retried_early = listener_state.has_changed().expect("listener alive");
    std::fs::remove_dir_all(&blocker).expect("remove blocking directory");

    assert!(!retried_early, "listener retried before its delay");

    tokio::time::timeout(WAIT, listener_state.changed())
        .await
        .expect("second accept attempt in time")
        .expect("listener alive");
    let waited = first_attempt.elapsed();
    assert_eq!(*listener_state.borrow_and_update(), ListenerState::Listening);
    assert!(waited >= RETRY_DELAY - Duration::from_millis(100), "{waited:?}");

    let (dialer, mut inbound) = Dialer::new(dialer_options(&name), &cancel);
    dialer.connect().await.expect("peer served after retry");
    assert!(matches!(
        next_envelope(&mut inbound).await.payload,
        Payload::Connected { .. }
    ));

    dialer.disconnect().await;
    listener.shutdown().await;
}
