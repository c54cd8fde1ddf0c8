//! Integration tests for the wire codec
//!
//! Sends encoded messages over real UDP sockets on localhost using ephemeral
//! ports, and drives an engine from datagrams read off a socket.

use board_sync::adapters::outbound::{LoggingBoard, MemoryHub};
use board_sync::replication::{
    Codec, Event, EventKind, Message, Point, SyncConfig, SyncEngine, WireFormat, MAX_DATAGRAM_SIZE,
};
use std::time::{Duration, Instant};
use board_sync::Datagram;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio_test::{assert_err, assert_ok};

async fn socket_pair() -> (UdpSocket, UdpSocket) {
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    (sender, receiver)
}

/// Read one datagram off the receiver after sending `data` to it.
async fn relay(data: &[u8]) -> Vec<u8> {
    let (sender, receiver) = socket_pair().await;
    sender.send_to(data, receiver.local_addr().unwrap()).await.unwrap();

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
    buf.truncate(len);
    buf
}

/// Binary layout of `depth` batches each wrapping the next, ending in `GetAll`.
fn nested_batch_bytes(depth: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(depth * 12 + 4);
    for _ in 0..depth {
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&1u64.to_le_bytes());
    }
    data.extend_from_slice(&0u32.to_le_bytes());
    data
}

async fn exchange(codec: Codec, msg: &Message) -> Message {
    let (sender, receiver) = socket_pair().await;
    let addr = receiver.local_addr().unwrap();

    let data = assert_ok!(codec.encode(msg));
    sender.send_to(&data, addr).await.unwrap();

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let (len, from) = receiver.recv_from(&mut buf).await.unwrap();
    assert_eq!(from, sender.local_addr().unwrap());

    assert_ok!(codec.decode(&buf[..len]))
}

/// Test a drawing event survives a JSON datagram
#[tokio::test]
async fn test_json_event_over_udp() {
    let event = Event::text(4, Point::new(10.5, -3.0), "over the wire", 0x336699, 14);
    let received = exchange(Codec::new(WireFormat::Json), &event.clone().into()).await;

    match received {
        Message::Event(got) => {
            assert_eq!(got.version, 4);
            match got.kind {
                EventKind::Text { text, font_size, .. } => {
                    assert_eq!(text, "over the wire");
                    assert_eq!(font_size, 14);
                }
                other => panic!("Expected Text event, got {:?}", other),
            }
        }
        other => panic!("Expected Event message, got {:?}", other),
    }
}

/// Test a nested batch survives a binary datagram
#[tokio::test]
async fn test_binary_batch_over_udp() {
    let msg = Message::batch(vec![
        Message::GetAll,
        Message::batch(vec![Event::move_area(2, Point::new(0.0, 0.0), Point::new(8.0, 6.0)).into()]),
        Message::get_versions(vec![5, 9]),
    ]);

    let received = exchange(Codec::new(WireFormat::Binary), &msg).await;
    assert_eq!(received, msg);
}

/// Test a datagram read off a socket drives a sync engine
#[tokio::test]
async fn test_udp_datagram_applied_by_engine() {
    let (sender, receiver) = socket_pair().await;
    let codec = Codec::default();

    let hub = MemoryHub::new();
    let board = Arc::new(LoggingBoard::default());
    let engine = SyncEngine::new(SyncConfig::new("udp"), Arc::new(hub.endpoint()), board.clone()).unwrap();

    let msg = Message::batch(vec![
        Event::point(1, Point::new(1.0, 1.0), 0xff0000).into(),
        Event::point(3, Point::new(3.0, 3.0), 0x00ff00).into(),
    ]);
    let data = assert_ok!(codec.encode(&msg));
    sender.send_to(&data, receiver.local_addr().unwrap()).await.unwrap();

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let (len, _) = receiver.recv_from(&mut buf).await.unwrap();

    let applied = engine.process_datagram(&Datagram::new(buf[..len].to_vec(), false));
    assert_eq!(applied, 2);
    assert_eq!(board.applied(), 2);
    assert_eq!(engine.missing_versions(), vec![2]);
}

/// Test a truncated datagram is rejected, not half-applied
#[tokio::test]
async fn test_truncated_datagram_rejected() {
    let (sender, receiver) = socket_pair().await;
    let codec = Codec::new(WireFormat::Json);

    let data = assert_ok!(codec.encode(&Event::point(1, Point::new(0.0, 0.0), 0).into()));
    sender
        .send_to(&data[..data.len() / 2], receiver.local_addr().unwrap())
        .await
        .unwrap();

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
    assert_err!(codec.decode(&buf[..len]));
}

/// Test a hostile nesting depth off the wire is rejected and the node keeps working
#[tokio::test]
async fn test_deeply_nested_binary_datagram_rejected_by_engine() {
    let data = relay(&nested_batch_bytes(5000)).await;
    assert!(data.len() <= MAX_DATAGRAM_SIZE);

    let hub = MemoryHub::new();
    let board = Arc::new(LoggingBoard::default());
    let config = SyncConfig::new("nested").wire_format(WireFormat::Binary);
    let engine = Arc::new(SyncEngine::new(config, Arc::new(hub.endpoint()), board.clone()).unwrap());

    // Run on a small stack so unbounded recursion would abort the test.
    let worker = engine.clone();
    let applied = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(move || worker.process_datagram(&Datagram::new(data, false)))
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(applied, 0);
    assert!(engine.queued().is_empty());

    let codec = Codec::new(WireFormat::Binary);
    let good = assert_ok!(codec.encode(&Event::point(1, Point::new(2.0, 2.0), 0x123456).into()));
    let data = relay(&good).await;
    assert_eq!(engine.process_datagram(&Datagram::new(data, false)), 1);
    assert_eq!(board.applied(), 1);
}

/// Test a far-future version off the wire is dropped without stalling the node
#[tokio::test]
async fn test_far_future_version_dropped_by_engine() {
    let codec = Codec::new(WireFormat::Binary);
    let hub = MemoryHub::new();
    let board = Arc::new(LoggingBoard::default());
    let config = SyncConfig::new("gap").wire_format(WireFormat::Binary);
    let engine = SyncEngine::new(config, Arc::new(hub.endpoint()), board.clone()).unwrap();

    let far = assert_ok!(codec.encode(&Event::point(1 << 40, Point::new(0.0, 0.0), 0).into()));
    let data = relay(&far).await;

    let started = Instant::now();
    assert_eq!(engine.process_datagram(&Datagram::new(data, false)), 0);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(engine.missing_versions().is_empty());
    assert_eq!(engine.highest_version(), 0);

    let near = assert_ok!(codec.encode(&Event::point(2, Point::new(1.0, 1.0), 0).into()));
    let data = relay(&near).await;
    assert_eq!(engine.process_datagram(&Datagram::new(data, false)), 1);
    assert_eq!(engine.missing_versions(), vec![1]);
    assert_eq!(board.applied(), 1);
}
