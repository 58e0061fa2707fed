mod support;

use phx_realtime::types::constants::phoenix_events;
use phx_realtime::{ConnectionState, Socket, SocketBuilder, SocketOptions, Transport};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use support::{wait_until, MockTransport};

const WAIT: Duration = Duration::from_secs(3);

fn test_socket(transport: &Arc<MockTransport>, heartbeat_interval: u64) -> Socket {
    SocketBuilder::new("ws://localhost:4000/socket/websocket")
        .options(SocketOptions {
            timeout: 500,
            heartbeat_interval,
            reconnect_after: Some(Arc::new(|_| Duration::from_millis(30))),
            ..Default::default()
        })
        .transport(Arc::clone(transport) as Arc<dyn Transport>)
        .build()
        .unwrap()
}

/// The transport only queues the `Closed` event; wait for the socket to
/// process it before asserting anything about reconnection.
async fn wait_disconnected(socket: &Socket) {
    assert!(
        wait_until(WAIT, || {
            let socket = socket.clone();
            async move { !socket.is_connected().await }
        })
        .await
    );
}

async fn wait_connected(socket: &Socket) {
    assert!(
        wait_until(WAIT, || {
            let socket = socket.clone();
            async move { socket.is_connected().await }
        })
        .await
    );
}

#[tokio::test]
async fn dropped_connection_reconnects_and_rejoins_once() {
    let transport = MockTransport::new();
    transport.ack_joins();
    transport.ack_heartbeats();
    let socket = test_socket(&transport, 60_000);
    socket.connect().await.unwrap();

    let channel = socket.channel("room:1", json!({})).await;
    channel.join(None).await.unwrap();
    assert!(wait_until(WAIT, || channel.is_joined()).await);

    transport.drop_connection().await;
    wait_disconnected(&socket).await;
    wait_connected(&socket).await;
    assert!(wait_until(WAIT, || channel.is_joined()).await);

    assert_eq!(transport.connects(), 2);
    let joins = transport.sent_with_event(phoenix_events::JOIN);
    assert_eq!(joins.len(), 2);
    // The rejoin is a fresh attempt under a new ref.
    assert_ne!(joins[0].r#ref, joins[1].r#ref);
}

#[tokio::test]
async fn failed_reconnect_attempts_back_off_and_retry() {
    let transport = MockTransport::new();
    transport.ack_joins();
    let socket = test_socket(&transport, 60_000);
    socket.connect().await.unwrap();

    transport.fail_next_connects(2);
    transport.drop_connection().await;
    wait_disconnected(&socket).await;

    wait_connected(&socket).await;
    // Initial connect, two scripted failures, then the one that stuck.
    assert_eq!(transport.connects(), 4);
}

#[tokio::test]
async fn manual_disconnect_suppresses_reconnection() {
    let transport = MockTransport::new();
    let socket = test_socket(&transport, 60_000);
    socket.connect().await.unwrap();

    let closes = Arc::new(AtomicUsize::new(0));
    {
        let closes = Arc::clone(&closes);
        socket
            .on_close(move || {
                closes.fetch_add(1, Ordering::SeqCst);
            })
            .await;
    }

    socket.disconnect().await.unwrap();
    assert_eq!(socket.connection_state().await, ConnectionState::Closed);
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.connects(), 1);
    assert_eq!(socket.connection_state().await, ConnectionState::Closed);
}

#[tokio::test]
async fn reconnecting_after_disconnect_is_explicit() {
    let transport = MockTransport::new();
    let socket = test_socket(&transport, 60_000);
    socket.connect().await.unwrap();
    socket.disconnect().await.unwrap();

    socket.connect().await.unwrap();
    assert!(socket.is_connected().await);
    assert_eq!(transport.connects(), 2);
}

#[tokio::test]
async fn heartbeats_are_probed_on_the_reserved_topic() {
    let transport = MockTransport::new();
    transport.ack_heartbeats();
    let socket = test_socket(&transport, 50);
    socket.connect().await.unwrap();

    assert!(wait_until(WAIT, || {
        let transport = Arc::clone(&transport);
        async move { transport.sent_with_event(phoenix_events::HEARTBEAT).len() >= 2 }
    })
    .await);

    let probes = transport.sent_with_event(phoenix_events::HEARTBEAT);
    assert!(probes.iter().all(|p| p.topic == "phoenix"));
    assert_ne!(probes[0].r#ref, probes[1].r#ref);
    // Acked probes never tear the connection down.
    assert!(socket.is_connected().await);
    assert_eq!(transport.connects(), 1);
}

#[tokio::test]
async fn unanswered_heartbeat_forces_a_reconnect() {
    let transport = MockTransport::new();
    let socket = test_socket(&transport, 50);
    socket.connect().await.unwrap();

    // First tick sends the probe, the next one finds it unanswered and
    // closes the connection; the close path then reconnects.
    assert!(wait_until(WAIT, || {
        let transport = Arc::clone(&transport);
        async move { transport.connects() >= 2 }
    })
    .await);
    assert!(wait_until(WAIT, || {
        let socket = socket.clone();
        async move { socket.is_connected().await }
    })
    .await);
}

#[tokio::test]
async fn open_callbacks_fire_on_every_connect() {
    let transport = MockTransport::new();
    transport.ack_heartbeats();
    let socket = test_socket(&transport, 60_000);

    let opens = Arc::new(AtomicUsize::new(0));
    {
        let opens = Arc::clone(&opens);
        socket
            .on_open(move || {
                opens.fetch_add(1, Ordering::SeqCst);
            })
            .await;
    }

    socket.connect().await.unwrap();
    assert_eq!(opens.load(Ordering::SeqCst), 1);

    transport.drop_connection().await;
    wait_disconnected(&socket).await;
    assert!(wait_until(WAIT, || {
        let opens = Arc::clone(&opens);
        async move { opens.load(Ordering::SeqCst) == 2 }
    })
    .await);
}

#[tokio::test]
async fn concurrent_connect_calls_dial_one_transport() {
    let transport = MockTransport::new();
    let socket = test_socket(&transport, 60_000);

    let (a, b) = tokio::join!(socket.connect(), socket.connect());
    a.unwrap();
    b.unwrap();

    assert!(socket.is_connected().await);
    assert_eq!(transport.connects(), 1);
}

#[tokio::test]
async fn one_heartbeat_loop_survives_repeated_reconnects() {
    let transport = MockTransport::new();
    transport.ack_heartbeats();
    let socket = test_socket(&transport, 100);
    socket.connect().await.unwrap();

    for _ in 0..2 {
        transport.drop_connection().await;
        wait_disconnected(&socket).await;
        wait_connected(&socket).await;
    }

    // A single loop ticks ~4 times in this window; leftover loops from the
    // dropped connections would multiply the probe count.
    let baseline = transport.sent_with_event(phoenix_events::HEARTBEAT).len();
    tokio::time::sleep(Duration::from_millis(450)).await;
    let probes = transport.sent_with_event(phoenix_events::HEARTBEAT).len() - baseline;
    assert!(probes <= 6, "{probes} probes in 450ms, more than one loop");
    assert!(socket.is_connected().await);
    assert_eq!(transport.connects(), 3);
}
