//! End-to-end relay tests
//!
//! Each client is a full session (reader, heartbeat monitor, router) driven
//! over the in-memory transport, so no sockets are opened.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_test::{assert_err, assert_ok};

use ara_relay_service::config::Settings;
use ara_relay_service::connection_manager::ConnectionId;
use ara_relay_service::lifecycle::DisconnectReason;
use ara_relay_service::router::RoutingMode;
use ara_relay_service::server::AppState;
use ara_relay_service::transport::memory::{self, MemoryPeer};
use ara_relay_service::transport::Frame;
use ara_relay_service::websocket::{parse_welcome_id, run_session, Envelope};

struct Client {
    id: ConnectionId,
    peer: MemoryPeer,
    session: JoinHandle<()>,
}

fn relay(mode: RoutingMode) -> AppState {
    let mut settings = Settings::default();
    settings.websocket.routing_mode = mode;
    AppState::new(settings)
}

/// Open a session and learn the assigned identity from the welcome message
async fn connect(state: &AppState) -> Client {
    let (sink, stream, mut peer) = memory::channel();
    let session = tokio::spawn(run_session(state.clone(), sink, stream));

    let welcome = peer.recv_text().await.expect("welcome message");
    let id = parse_welcome_id(&welcome).expect("identity in welcome message");

    Client { id, peer, session }
}

fn envelope(to: &ConnectionId, message: &str) -> String {
    serde_json::json!({ "id": to.as_str(), "message": message }).to_string()
}

/// Answer every probe until the relay drops the connection
fn answer_pings(mut peer: MemoryPeer) -> JoinHandle<MemoryPeer> {
    tokio::spawn(async move {
        while let Some(frame) = peer.recv().await {
            if let Frame::Ping(data) = frame {
                if !peer.send(Frame::Pong(data)) {
                    break;
                }
            }
        }
        peer
    })
}

#[tokio::test]
async fn test_unicast_delivers_to_named_recipient() {
    let state = relay(RoutingMode::Unicast);
    let a = connect(&state).await;
    let mut b = connect(&state).await;

    assert!(a.peer.send_text(envelope(&b.id, "hello")));

    let received = b.peer.recv_text().await.unwrap();
    assert_eq!(received, format!("You have message from {}: hello", a.id));
}

#[tokio::test]
async fn test_unicast_unknown_recipient_is_dropped() {
    let state = relay(RoutingMode::Unicast);
    let a = connect(&state).await;
    let mut b = connect(&state).await;

    assert!(a.peer.send_text(envelope(&ConnectionId::from("zz"), "lost")));
    assert!(a.peer.send_text("not json"));
    assert!(a.peer.send_text(envelope(&b.id, "second")));

    // Nothing reached B before the second, valid message
    let received = b.peer.recv_text().await.unwrap();
    assert_eq!(received, format!("You have message from {}: second", a.id));

    // The sender is unaffected by its own bad messages
    assert!(state.registry.contains(a.id.as_str()));
    assert!(!a.session.is_finished());
}

#[tokio::test]
async fn test_broadcast_reaches_everyone_but_sender() {
    let state = relay(RoutingMode::Broadcast);
    let mut a = connect(&state).await;
    let mut b = connect(&state).await;
    let mut c = connect(&state).await;

    assert!(a.peer.send_text("hi"));
    assert_eq!(b.peer.recv_text().await.unwrap(), "hi");
    assert_eq!(c.peer.recv_text().await.unwrap(), "hi");

    // A's first text after joining is B's message, not its own echo
    assert!(b.peer.send_text("yo"));
    assert_eq!(a.peer.recv_text().await.unwrap(), "yo");
    assert_eq!(c.peer.recv_text().await.unwrap(), "yo");
}

#[tokio::test]
async fn test_broadcast_preserves_binary_frames() {
    let state = relay(RoutingMode::Broadcast);
    let a = connect(&state).await;
    let mut b = connect(&state).await;

    assert!(a.peer.send(Frame::Binary(vec![1, 2, 3])));

    let frame = loop {
        match b.peer.recv().await.unwrap() {
            Frame::Ping(_) => continue,
            frame => break frame,
        }
    };
    assert_eq!(frame, Frame::Binary(vec![1, 2, 3]));
}

#[tokio::test]
async fn test_messages_from_one_sender_arrive_in_order() {
    let state = relay(RoutingMode::Unicast);
    let a = connect(&state).await;
    let mut b = connect(&state).await;

    for i in 0..100 {
        assert!(a.peer.send_text(envelope(&b.id, &i.to_string())));
    }

    for i in 0..100 {
        let received = b.peer.recv_text().await.unwrap();
        assert_eq!(received, format!("You have message from {}: {}", a.id, i));
    }
}

#[tokio::test]
async fn test_read_failure_removes_connection() {
    let state = relay(RoutingMode::Unicast);
    let mut a = connect(&state).await;

    a.peer.fail_read("connection reset");
    assert_ok!(a.session.await);

    assert!(!state.registry.contains(a.id.as_str()));
    assert_eq!(a.peer.close_count(), 1);
}

#[tokio::test]
async fn test_peer_hang_up_removes_connection() {
    let state = relay(RoutingMode::Unicast);
    let mut a = connect(&state).await;
    let b = connect(&state).await;

    a.peer.hang_up();
    assert_ok!(a.session.await);

    assert_eq!(state.registry.ids(), vec![b.id.clone()]);
    assert_eq!(state.registry.stats().total_removed, 1);
}

#[tokio::test]
async fn test_write_failure_evicts_recipient_once() {
    let state = relay(RoutingMode::Broadcast);
    let a = connect(&state).await;
    let mut b = connect(&state).await;

    b.peer.fail_writes(true);
    assert!(a.peer.send_text("hi"));
    // B's read side fails too; both paths race to tear B down
    b.peer.fail_read("connection reset");
    assert_ok!(b.session.await);

    assert!(!state.registry.contains(b.id.as_str()));
    assert!(state.registry.contains(a.id.as_str()));
    assert_eq!(b.peer.close_count(), 1);
    assert_eq!(state.registry.stats().total_removed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_silent_peer_is_evicted() {
    let state = relay(RoutingMode::Unicast);
    let mut a = connect(&state).await;

    let started = tokio::time::Instant::now();
    assert_ok!(a.session.await);

    // Two unanswered probes, then eviction once the idle time exceeds the timeout
    assert!(started.elapsed() > state.settings.websocket.pong_timeout());
    let pings = a.peer.drain().iter().filter(|f| f.is_ping()).count();
    assert_eq!(pings, 2);
    assert!(state.registry.is_empty());
    assert_eq!(a.peer.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_responsive_peer_stays_registered() {
    let state = relay(RoutingMode::Unicast);
    let a = connect(&state).await;
    let responder = answer_pings(a.peer);

    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(state.registry.contains(a.id.as_str()));
    assert!(!a.session.is_finished());

    state
        .lifecycle
        .on_disconnect(&a.id, DisconnectReason::PeerClosed)
        .await;
    assert_ok!(a.session.await);
    responder.abort();
}

#[tokio::test(start_paused = true)]
async fn test_membership_is_connected_minus_evicted() {
    let state = relay(RoutingMode::Unicast);
    let a = connect(&state).await;
    let b = connect(&state).await;
    let silent = connect(&state).await;

    let responders = vec![answer_pings(a.peer), answer_pings(b.peer)];

    assert_ok!(silent.session.await);
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(state.registry.ids(), vec![a.id.clone(), b.id.clone()]);
    assert_eq!(state.registry.stats().total_removed, 1);

    for responder in responders {
        responder.abort();
    }
}

#[tokio::test]
async fn test_torn_down_sender_queued_message_is_not_delivered() {
    for _ in 0..20 {
        let state = relay(RoutingMode::Broadcast);
        let a = connect(&state).await;
        let mut b = connect(&state).await;

        // The frame is buffered before the teardown reaches A's reader
        assert!(a.peer.send_text("after-evict"));
        state
            .lifecycle
            .on_disconnect(&a.id, DisconnectReason::PeerClosed)
            .await;
        assert_ok!(a.session.await);

        assert!(b.peer.drain().iter().all(|f| f.as_text() != Some("after-evict")));
        assert_eq!(state.registry.ids(), vec![b.id.clone()]);
    }
}

#[tokio::test]
async fn test_failed_welcome_ends_session() {
    let state = relay(RoutingMode::Unicast);
    let b = connect(&state).await;

    let (sink, stream, peer) = memory::channel();
    peer.fail_writes(true);
    assert_ok!(tokio::spawn(run_session(state.clone(), sink, stream)).await);

    assert_eq!(state.registry.ids(), vec![b.id.clone()]);
    assert_eq!(peer.close_count(), 1);
    assert_eq!(state.registry.stats().total_removed, 1);
}

#[tokio::test]
async fn test_unicast_keeps_binary_frame_kind() {
    let state = relay(RoutingMode::Unicast);
    let a = connect(&state).await;
    let mut b = connect(&state).await;

    assert!(a.peer.send(Frame::Binary(envelope(&b.id, "bytes").into_bytes())));

    let frame = loop {
        match b.peer.recv().await.unwrap() {
            Frame::Ping(_) => continue,
            frame => break frame,
        }
    };
    let expected = format!("You have message from {}: bytes", a.id);
    assert_eq!(frame, Frame::Binary(expected.into_bytes()));
}

#[test]
fn test_envelope_parsing() {
    assert_ok!(Envelope::parse(br#"{"id":"b2","message":"hi"}"#));
    assert_err!(Envelope::parse(b"not json"));
}
