//! Integration tests for the sync engine
//!
//! Runs several engines inside one process over an in-memory multicast hub.

use board_sync::adapters::outbound::{LoggingBoard, MemoryHub, MemoryTransport};
use board_sync::replication::{
    Codec, EchoMode, Event, Message, NodePhase, Point, SyncConfig, SyncEngine,
};
use board_sync::Transport;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

struct Node {
    engine: Arc<SyncEngine>,
    board: Arc<LoggingBoard>,
    transport: Arc<MemoryTransport>,
}

fn node(hub: &MemoryHub, name: &str) -> Node {
    node_with(hub, SyncConfig::new(name))
}

fn node_with(hub: &MemoryHub, config: SyncConfig) -> Node {
    let transport = Arc::new(hub.endpoint());
    let board = Arc::new(LoggingBoard::default());
    let config = config.reconcile_interval(Duration::from_millis(50));
    let engine = Arc::new(SyncEngine::new(config, transport.clone(), board.clone()).unwrap());
    Node {
        engine,
        board,
        transport,
    }
}

/// Poll until the condition holds, for at most two seconds.
async fn eventually(condition: impl Fn() -> bool) -> bool {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

async fn shutdown(nodes: &[&Node]) {
    for node in nodes {
        node.engine.stop();
    }
    for node in nodes {
        node.engine.wait().await;
    }
}

fn originate_point(engine: &SyncEngine, x: f64) -> Event {
    let event = Event::point(engine.next_version(), Point::new(x, x), 0xabcdef);
    engine.send_message(event.clone().into());
    event
}

/// An event originated on one node shows up on the other.
#[tokio::test]
async fn test_event_reaches_peer() {
    let hub = MemoryHub::new();
    let a = node(&hub, "a");
    let b = node(&hub, "b");
    a.engine.start();
    b.engine.start();

    let event = originate_point(&a.engine, 1.0);
    assert_eq!(event.version, 1);

    assert!(eventually(|| b.engine.stored_len() == 1).await);
    assert_eq!(b.engine.events_at(1), vec![event]);
    assert_eq!(b.board.applied(), 1);

    // Local echo applied it on the originator exactly once.
    assert!(eventually(|| a.board.applied() == 1).await);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(a.board.applied(), 1);

    shutdown(&[&a, &b]).await;
}

/// A late joiner receives the existing log through its initial request.
#[tokio::test]
async fn test_late_joiner_receives_backlog() {
    let hub = MemoryHub::new();
    let a = node(&hub, "a");
    a.engine.start();
    for x in 0..5 {
        originate_point(&a.engine, x as f64);
    }
    assert!(eventually(|| a.engine.stored_len() == 5).await);

    let b = node(&hub, "b");
    b.engine.start();

    assert!(eventually(|| b.engine.stored_len() == 5).await);
    assert_eq!(b.engine.stored_versions(), vec![1, 2, 3, 4, 5]);
    assert!(b.engine.missing_versions().is_empty());
    assert_eq!(b.engine.next_version(), 6);

    shutdown(&[&a, &b]).await;
}

/// Seeded with {1, 3}, a node ends up with {1, 2, 3} and nothing missing.
#[tokio::test]
async fn test_gap_is_repaired() {
    let hub = MemoryHub::new();
    let a = node(&hub, "a");
    let b = node(&hub, "b");

    let events: Vec<Event> = (1..=3)
        .map(|v| Event::point(v, Point::new(v as f64, 0.0), 0))
        .collect();
    for event in &events {
        a.engine.handle_message(event.clone().into());
    }
    b.engine.handle_message(events[0].clone().into());
    b.engine.handle_message(events[2].clone().into());
    assert_eq!(b.engine.missing_versions(), vec![2]);

    a.engine.start();
    b.engine.start();

    assert!(eventually(|| b.engine.stored_versions() == vec![1, 2, 3]).await);
    assert!(eventually(|| b.engine.missing_versions().is_empty()).await);
    assert_eq!(b.engine.events_at(2), vec![events[1].clone()]);

    shutdown(&[&a, &b]).await;
}

/// Datagrams lost while a node was deaf are recovered by reconciliation.
#[tokio::test]
async fn test_lost_datagrams_are_requested_again() {
    let hub = MemoryHub::new();
    let a = node(&hub, "a");
    let b = node(&hub, "b");
    a.engine.start();
    b.engine.start();
    assert!(eventually(|| b.engine.phase() == NodePhase::Steady).await);

    b.transport.set_receiving(false);
    for x in 0..3 {
        originate_point(&a.engine, x as f64);
    }
    assert!(eventually(|| a.engine.queue_len() == 0 && a.engine.stored_len() == 3).await);
    sleep(Duration::from_millis(30)).await;
    assert_eq!(b.engine.stored_len(), 0);

    b.transport.set_receiving(true);
    let last = originate_point(&a.engine, 9.0);
    assert_eq!(last.version, 4);

    assert!(eventually(|| b.engine.stored_versions() == vec![1, 2, 3, 4]).await);
    assert!(b.engine.missing_versions().is_empty());
    assert_eq!(b.board.applied(), 4);

    shutdown(&[&a, &b]).await;
}

/// A node with a hole multicasts GetVersions for it every reconcile tick.
#[tokio::test]
async fn test_missing_versions_are_multicast() {
    let hub = MemoryHub::new();
    let listener = hub.endpoint();
    let b = node(&hub, "b");

    b.engine.handle_message(Event::point(1, Point::new(0.0, 0.0), 0).into());
    b.engine.handle_message(Event::point(3, Point::new(0.0, 0.0), 0).into());
    b.engine.start();

    let codec = Codec::default();
    let request = timeout(Duration::from_secs(1), async {
        loop {
            let datagram = listener.recv().await.unwrap();
            if let Ok(Message::GetVersions { versions }) = codec.decode(&datagram.payload) {
                return versions;
            }
        }
    })
    .await;

    assert_eq!(request.unwrap(), vec![2]);
    shutdown(&[&b]).await;
}

/// With multicast echo a node applies its own events off the wire.
#[tokio::test]
async fn test_multicast_echo_applies_own_events() {
    let hub = MemoryHub::new();
    let a = node_with(&hub, SyncConfig::new("a").echo_mode(EchoMode::Multicast));
    a.engine.start();

    originate_point(&a.engine, 1.0);
    assert!(eventually(|| a.engine.stored_len() == 1).await);
    assert_eq!(a.board.applied(), 1);

    shutdown(&[&a]).await;
}

/// Three nodes originating at once all pick version 1 and keep every event.
#[tokio::test]
async fn test_three_nodes_converge() {
    let hub = MemoryHub::new();
    let nodes: Vec<Node> = ["a", "b", "c"].iter().map(|n| node(&hub, n)).collect();
    for node in &nodes {
        node.engine.start();
    }

    let originated: HashSet<Event> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| originate_point(&node.engine, i as f64))
        .collect();
    assert!(originated.iter().all(|e| e.version == 1));

    assert!(
        eventually(|| nodes.iter().all(|n| {
            n.engine.stored_events().into_iter().collect::<HashSet<_>>() == originated
        }))
        .await
    );
    for node in &nodes {
        assert_eq!(node.engine.stored_versions(), vec![1]);
        assert!(node.engine.missing_versions().is_empty());
        assert_eq!(node.engine.next_version(), 2);
    }

    let refs: Vec<&Node> = nodes.iter().collect();
    shutdown(&refs).await;
}

/// Stopping the engine ends every loop promptly even while a receive is pending.
#[tokio::test]
async fn test_stop_ends_loops() {
    let hub = MemoryHub::new();
    let a = node(&hub, "a");
    assert!(a.engine.start());
    assert!(!a.engine.start());

    a.engine.stop();
    assert!(timeout(Duration::from_secs(1), a.engine.wait()).await.is_ok());
    assert_eq!(a.engine.phase(), NodePhase::ShuttingDown);
}

/// Raw datagrams from a foreign sender are decoded and applied.
#[tokio::test]
async fn test_foreign_sender_datagram_is_applied() {
    let hub = MemoryHub::new();
    let outsider = hub.endpoint();
    let a = node(&hub, "a");
    a.engine.start();

    let payload = br#"{"Event":{"version":7,"kind":{"Point":{"at":{"x":1.0,"y":2.0},"color":255}}}}"#;
    outsider.send(payload).await.unwrap();

    assert!(eventually(|| a.engine.highest_version() == 7).await);
    assert_eq!(a.engine.missing_versions(), (1..7).collect::<Vec<_>>());

    shutdown(&[&a]).await;
}
