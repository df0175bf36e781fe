#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Integration tests for the connection lifecycle of [`RemoteClient`].
//!
//! All tests run on a paused clock, so grace periods and heartbeat timeouts
//! elapse instantly and deterministically.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use playback_remote::transport::SessionEvent;
use playback_remote::{ConnectionStatus, RemoteClient, RemoteConfig, RemoteControl, RemoteError};
use serde_json::json;
use tokio::time::Instant;

use common::{assert_elapsed, record_statuses, settle, wait_for_status, ScriptedConnector};

const HYDRATION: [&str; 4] = ["getVolume", "getState", "getMute", "getCurrentSong"];

fn is_disconnected(status: &ConnectionStatus) -> bool {
    *status == ConnectionStatus::Disconnected
}

/// Start a client on a fresh connector and bring its first session up.
async fn connected_client(config: RemoteConfig) -> (RemoteClient, ScriptedConnector) {
    let connector = ScriptedConnector::new();
    let mut client = RemoteClient::new(connector.clone(), config);
    client.start().unwrap();
    connector.wait_for_session(1).await.connect();
    wait_for_status(&client, ConnectionStatus::is_connected).await;
    (client, connector)
}

// ── Connect and hydrate ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn start_then_connect_success_hydrates_exactly_once() {
    let connector = ScriptedConnector::new();
    let mut client = RemoteClient::new(connector.clone(), RemoteConfig::default());
    assert_eq!(client.status(), ConnectionStatus::Disconnected);

    client.start().unwrap();
    let session = connector.wait_for_session(1).await;
    wait_for_status(&client, |s| *s == ConnectionStatus::Connecting).await;
    assert!(session.emitted_names().is_empty());

    session.connect();
    wait_for_status(&client, ConnectionStatus::is_connected).await;
    assert_eq!(session.emitted_names(), HYDRATION);

    // A steady link never re-hydrates, even on a duplicate connect event.
    session.connect();
    session.message("ping", Vec::new());
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(session.emitted_names(), HYDRATION);
    assert!(client.status().is_connected());

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn connect_error_while_connecting_reports_error() {
    let connector = ScriptedConnector::new();
    let mut client = RemoteClient::new(connector.clone(), RemoteConfig::default());
    client.start().unwrap();
    let session = connector.wait_for_session(1).await;

    session.send(SessionEvent::ConnectError("connection refused".into()));
    let status = wait_for_status(&client, |s| matches!(s, ConnectionStatus::Error { .. })).await;
    assert_eq!(
        status,
        ConnectionStatus::Error {
            message: "connection refused".into()
        }
    );
    assert!(status.blocks_interaction());

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn connect_error_without_detail_reports_disconnected() {
    let connector = ScriptedConnector::new();
    let mut client = RemoteClient::new(connector.clone(), RemoteConfig::default());
    client.start().unwrap();
    let session = connector.wait_for_session(1).await;
    settle().await;

    session.send(SessionEvent::ConnectError(String::new()));
    wait_for_status(&client, is_disconnected).await;

    // The session keeps retrying on its own and may still come up.
    session.connect();
    wait_for_status(&client, ConnectionStatus::is_connected).await;
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn init_failure_is_recoverable_through_reconnect() {
    let connector = ScriptedConnector::new();
    connector.fail_next_open("invalid server url");
    let mut client = RemoteClient::new(connector.clone(), RemoteConfig::default());
    client.start().unwrap();

    let status = wait_for_status(&client, |s| matches!(s, ConnectionStatus::Error { .. })).await;
    let ConnectionStatus::Error { message } = &status else {
        panic!("expected Error, got {status:?}");
    };
    assert!(message.contains("invalid server url"), "{message}");
    assert_eq!(connector.session_count(), 0);

    client.reconnect().unwrap();
    let session = connector.wait_for_session(1).await;
    settle().await;
    session.connect();
    wait_for_status(&client, ConnectionStatus::is_connected).await;
    assert_eq!(session.emitted_names(), HYDRATION);

    client.shutdown().await;
}

// ── Heartbeat and grace period ──────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn heartbeat_silence_enters_grace_then_disconnects() {
    let config = RemoteConfig::default().with_heartbeat_interval(Duration::from_secs(1));
    let (mut client, _connector) = connected_client(config).await;
    let connected_at = Instant::now();

    let status = wait_for_status(&client, ConnectionStatus::is_grace_period).await;
    let ConnectionStatus::GracePeriod { since } = status else {
        panic!("expected GracePeriod, got {status:?}");
    };
    assert_elapsed(since - connected_at, Duration::from_secs(46));
    assert!(!status.blocks_interaction());

    wait_for_status(&client, is_disconnected).await;
    assert_elapsed(Instant::now() - since, Duration::from_secs(3));

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn pulses_keep_the_link_connected() {
    let config = RemoteConfig::default().with_heartbeat_interval(Duration::from_secs(1));
    let (mut client, connector) = connected_client(config).await;
    let session = connector.session(0);

    for _ in 0..6 {
        tokio::time::sleep(Duration::from_secs(30)).await;
        session.message("ping", Vec::new());
        settle().await;
        assert!(client.status().is_connected());
    }

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disabled_heartbeat_never_times_out() {
    let config = RemoteConfig::default().without_heartbeat();
    let (mut client, _connector) = connected_client(config).await;

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(client.status().is_connected());

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn repeated_loss_signals_do_not_extend_the_grace_window() {
    let (mut client, connector) = connected_client(RemoteConfig::default()).await;
    let session = connector.session(0);

    session.drop_link();
    let status = wait_for_status(&client, ConnectionStatus::is_grace_period).await;
    let ConnectionStatus::GracePeriod { since } = status else {
        panic!("expected GracePeriod, got {status:?}");
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    session.drop_link();
    session.send(SessionEvent::ConnectError("still down".into()));
    settle().await;
    assert_eq!(client.status(), ConnectionStatus::GracePeriod { since });

    wait_for_status(&client, is_disconnected).await;
    assert_elapsed(Instant::now() - since, Duration::from_secs(3));

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn recovery_within_grace_never_passes_through_disconnected() {
    let (mut client, connector) = connected_client(RemoteConfig::default()).await;
    let session = connector.session(0);
    let seen = record_statuses(&client);

    session.drop_link();
    wait_for_status(&client, ConnectionStatus::is_grace_period).await;

    tokio::time::sleep(Duration::from_secs(2)).await;
    session.connect();
    wait_for_status(&client, ConnectionStatus::is_connected).await;

    let mut expected: Vec<&str> = HYDRATION.to_vec();
    expected.extend(HYDRATION);
    assert_eq!(session.emitted_names(), expected);

    // Well past the original deadline; it must have been cancelled.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(client.status().is_connected());

    settle().await;
    let seen = seen.lock().unwrap().clone();
    assert!(!seen.contains(&ConnectionStatus::Disconnected), "{seen:?}");

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn session_healing_after_disconnect_reconnects_and_hydrates() {
    let (mut client, connector) = connected_client(RemoteConfig::default()).await;
    let session = connector.session(0);

    session.drop_link();
    wait_for_status(&client, is_disconnected).await;

    session.connect();
    wait_for_status(&client, ConnectionStatus::is_connected).await;
    assert_eq!(session.emitted_names().len(), 8);

    client.shutdown().await;
}

// ── Reconnect ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Target {
    Idle,
    Connecting,
    Connected,
    GracePeriod,
    Disconnected,
    Error,
}

/// Bring a client to `target` and return it with its connector.
async fn client_in(target: Target) -> (RemoteClient, ScriptedConnector) {
    let connector = ScriptedConnector::new();
    let mut client = RemoteClient::new(connector.clone(), RemoteConfig::default());
    match target {
        Target::Idle => return (client, connector),
        Target::Error => {
            connector.fail_next_open("boom");
            client.start().unwrap();
            wait_for_status(&client, |s| matches!(s, ConnectionStatus::Error { .. })).await;
            return (client, connector);
        }
        _ => client.start().unwrap(),
    }

    let session = connector.wait_for_session(1).await;
    settle().await;
    if matches!(target, Target::Connecting) {
        return (client, connector);
    }

    session.connect();
    wait_for_status(&client, ConnectionStatus::is_connected).await;
    if matches!(target, Target::Connected) {
        return (client, connector);
    }

    session.drop_link();
    wait_for_status(&client, ConnectionStatus::is_grace_period).await;
    if matches!(target, Target::GracePeriod) {
        return (client, connector);
    }

    wait_for_status(&client, is_disconnected).await;
    (client, connector)
}

#[tokio::test(start_paused = true)]
async fn reconnect_from_every_state_leaves_one_live_session() {
    for target in [
        Target::Idle,
        Target::Connecting,
        Target::Connected,
        Target::GracePeriod,
        Target::Disconnected,
        Target::Error,
    ] {
        let (mut client, connector) = client_in(target).await;
        let before = connector.session_count();

        client.reconnect().unwrap();
        if matches!(target, Target::Idle) {
            client.start().unwrap();
        }
        connector.wait_for_session(before + 1).await;
        settle().await;

        assert_eq!(
            client.status(),
            ConnectionStatus::Connecting,
            "reconnect from {target:?}"
        );
        assert_eq!(connector.live_sessions(), 1, "reconnect from {target:?}");

        // A grace deadline left over from before must not fire.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            client.status(),
            ConnectionStatus::Connecting,
            "after reconnect from {target:?}"
        );

        client.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn listeners_are_bound_once_per_session_across_reconnects() {
    let connector = ScriptedConnector::new();
    let mut client = RemoteClient::new(connector.clone(), RemoteConfig::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    client
        .on("songChanged", move |_args| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    client.start().unwrap();

    for n in 1..=3 {
        let session = connector.wait_for_session(n).await;
        settle().await;
        session.connect();
        wait_for_status(&client, ConnectionStatus::is_connected).await;
        if n < 3 {
            client.reconnect().unwrap();
        }
    }

    for n in 0..3 {
        let subscribed = connector.session(n).subscribed.lock().unwrap().clone();
        assert_eq!(
            subscribed.iter().filter(|e| *e == "songChanged").count(),
            1,
            "session {n}: {subscribed:?}"
        );
        assert_eq!(subscribed.iter().filter(|e| *e == "ping").count(), 1);
    }

    connector.latest().message("songChanged", vec![json!("fast")]);
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    client.shutdown().await;
}

// ── Shutdown ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn shutdown_during_grace_is_terminal() {
    let (mut client, connector) = connected_client(RemoteConfig::default()).await;
    let session = connector.session(0);
    session.drop_link();
    wait_for_status(&client, ConnectionStatus::is_grace_period).await;

    client.shutdown().await;
    assert!(session.is_closed());
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert!(!client.is_running());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert!(matches!(client.reconnect(), Err(RemoteError::ShutDown)));
    assert!(matches!(client.start(), Err(RemoteError::ShutDown)));
    assert_eq!(connector.session_count(), 1);
}

// ── Remote control facade ───────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn mirror_clamps_volume_and_drops_bad_payloads() {
    let connector = ScriptedConnector::new();
    let client = RemoteClient::new(connector.clone(), RemoteConfig::default());
    let mut remote = RemoteControl::new(client).unwrap();
    remote.start().unwrap();
    let session = connector.wait_for_session(1).await;
    settle().await;
    session.connect();
    wait_for_status(remote.client(), ConnectionStatus::is_connected).await;

    let mut volume = remote.mirror().watch_volume();
    session.message("volumeChanged", vec![json!(150)]);
    volume.wait_for(|v| *v == 100).await.unwrap();

    session.message("volumeChanged", vec![json!("loud")]);
    session.message("stateChanged", vec![json!(1)]);
    let mut state = remote.mirror().watch_playback_state();
    state.wait_for(|s| *s == 1).await.unwrap();

    assert_eq!(remote.mirror().volume(), 100);
    assert!(remote.status().is_connected());

    remote.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn remote_commands_follow_the_mirrored_state() {
    let connector = ScriptedConnector::new();
    let client = RemoteClient::new(connector.clone(), RemoteConfig::default());
    let mut remote = RemoteControl::new(client).unwrap();
    remote.start().unwrap();
    let session = connector.wait_for_session(1).await;
    settle().await;
    session.connect();
    wait_for_status(remote.client(), ConnectionStatus::is_connected).await;
    session.emitted.lock().unwrap().clear();

    let last = || session.emitted.lock().unwrap().last().cloned().unwrap();

    remote.change_volume(150).unwrap();
    settle().await;
    assert_eq!(last(), ("changeVolume".to_string(), vec![json!(100)]));

    session.message("stateChanged", vec![json!(1)]);
    remote
        .mirror()
        .watch_playback_state()
        .wait_for(|s| *s == 1)
        .await
        .unwrap();
    remote.toggle_playback().unwrap();
    settle().await;
    assert_eq!(last(), ("changeState".to_string(), vec![json!(0)]));

    remote.toggle_mute().unwrap();
    settle().await;
    assert_eq!(last(), ("changeMute".to_string(), vec![json!(1)]));

    assert!(!remote.change_song("slow").unwrap());
    assert!(remote.change_song("fast").unwrap());
    settle().await;
    assert_eq!(
        last(),
        ("changeSong".to_string(), vec![json!("slow"), json!("fast")])
    );
    // The mirror only follows the server.
    assert_eq!(remote.mirror().current_song(), "slow");

    remote.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn playback_commands_keep_the_controls_busy_briefly() {
    let connector = ScriptedConnector::new();
    let client = RemoteClient::new(connector.clone(), RemoteConfig::default());
    let mut remote = RemoteControl::new(client).unwrap();
    remote.start().unwrap();
    let session = connector.wait_for_session(1).await;
    settle().await;
    session.connect();
    wait_for_status(remote.client(), ConnectionStatus::is_connected).await;

    // Stopped: a song switch leaves the controls free.
    assert!(remote.change_song("fast").unwrap());
    assert!(!remote.is_processing());

    let started = Instant::now();
    remote.toggle_playback().unwrap();
    assert!(remote.is_processing());
    remote
        .watch_processing()
        .wait_for(|busy| !*busy)
        .await
        .unwrap();
    assert_elapsed(started.elapsed(), Duration::from_millis(1500));

    // Playing: even a song request that sends nothing marks them busy.
    session.message("stateChanged", vec![json!(1)]);
    remote
        .mirror()
        .watch_playback_state()
        .wait_for(|s| *s == 1)
        .await
        .unwrap();
    assert!(!remote.change_song("slow").unwrap());
    assert!(remote.is_processing());

    remote.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn operator_reconnect_is_throttled() {
    let connector = ScriptedConnector::new();
    let client = RemoteClient::new(connector.clone(), RemoteConfig::default());
    let mut remote = RemoteControl::new(client).unwrap();
    remote.start().unwrap();
    connector.wait_for_session(1).await;

    assert!(remote.request_reconnect().unwrap());
    assert!(!remote.request_reconnect().unwrap());
    connector.wait_for_session(2).await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(remote.request_reconnect().unwrap());
    connector.wait_for_session(3).await;
    settle().await;
    assert_eq!(connector.session_count(), 3);
    assert_eq!(connector.live_sessions(), 1);

    remote.shutdown().await;
}
