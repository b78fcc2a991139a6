//! Full path: real relay on a loopback port, two coordinators negotiating
//! through it, files crossing the in-memory data channel.

use std::time::Duration;

use airbridge::peer::memory::MemoryNetwork;
use airbridge::peer::{Coordinator, CoordinatorEvent, PeerError, SignalingClient};
use airbridge::signaling::{RoomId, RoomManagerHandle, ServerMessage, SignalingServer};
use airbridge::transfer::{FileStatus, SharedFile};
use bytes::Bytes;
use tokio::net::TcpListener;

async fn start_relay() -> (String, RoomManagerHandle) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let server = SignalingServer::new();
    let handle = server.handle();
    tokio::spawn(async move { server.serve(listener).await });
    (url, handle)
}

async fn next_event(events: &async_channel::Receiver<CoordinatorEvent>) -> CoordinatorEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("Timeout waiting for coordinator event")
        .expect("coordinator gone")
}

fn sample(len: usize, seed: u8) -> Bytes {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(seed).wrapping_add(seed))
        .collect::<Vec<_>>()
        .into()
}

#[tokio::test]
async fn two_files_reach_the_receiver_in_protocol_order() {
    let (url, _handle) = start_relay().await;
    let network = MemoryNetwork::new();
    let room = RoomId::generate();

    let a = sample(10, 3);
    let b = sample(20000, 7);

    // sender creates the room and waits for joiners
    let sender_client = SignalingClient::connect(&url).await.unwrap();
    sender_client.create(room.clone()).unwrap();
    let (sender_out, sender_in) = sender_client.into_parts();
    let (sender_tx, sender_events) = async_channel::unbounded();
    let sender = Coordinator::new(network.connector(), sender_out, sender_tx).with_files(vec![
        SharedFile::in_memory("a.txt", a.clone()),
        SharedFile::in_memory("b.bin", b.clone()),
    ]);
    tokio::spawn(sender.run(sender_in));

    match next_event(&sender_events).await {
        CoordinatorEvent::Joined { peers, .. } => assert!(peers.is_empty()),
        other => panic!("expected joined, got {:?}", other),
    }

    let receiver_client = SignalingClient::connect(&url).await.unwrap();
    receiver_client.join(room.clone(), None).unwrap();
    let (receiver_out, receiver_in) = receiver_client.into_parts();
    let (receiver_tx, receiver_events) = async_channel::unbounded();
    let receiver = Coordinator::new(network.connector(), receiver_out, receiver_tx);
    tokio::spawn(receiver.run(receiver_in));

    let mut order = Vec::new();
    let mut files = Vec::new();
    let statuses = loop {
        match next_event(&receiver_events).await {
            CoordinatorEvent::Joined { peers, .. } => assert_eq!(peers.len(), 1),
            CoordinatorEvent::PeerConnected(_) => {}
            CoordinatorEvent::Manifest { files, .. } => order.push(format!("init {:?}", files)),
            CoordinatorEvent::FileStarted { name, size, .. } => order.push(format!("start {} {}", name, size)),
            CoordinatorEvent::Progress { .. } => {}
            CoordinatorEvent::FileReceived { name, data, .. } => {
                order.push(format!("end {}", name));
                files.push((name, data));
            }
            CoordinatorEvent::TransferFinished { statuses, .. } => break statuses,
            other => panic!("unexpected {:?}", other),
        }
    };

    assert_eq!(
        order,
        vec![
            r#"init ["a.txt", "b.bin"]"#,
            "start a.txt 10",
            "end a.txt",
            "start b.bin 20000",
            "end b.bin",
        ]
    );
    assert_eq!(files, vec![("a.txt".to_string(), a), ("b.bin".to_string(), b)]);
    assert_eq!(
        statuses,
        vec![
            FileStatus {
                name: "a.txt".into(),
                complete: true
            },
            FileStatus {
                name: "b.bin".into(),
                complete: true
            },
        ]
    );
}

#[tokio::test]
async fn progress_for_a_multi_chunk_file_climbs_to_100() {
    let (url, _handle) = start_relay().await;
    let network = MemoryNetwork::new();
    let room = RoomId::generate();

    let sender_client = SignalingClient::connect(&url).await.unwrap();
    sender_client.create(room.clone()).unwrap();
    let (out, inbound) = sender_client.into_parts();
    let (tx, sender_events) = async_channel::unbounded();
    let sender = Coordinator::new(network.connector(), out, tx)
        .with_files(vec![SharedFile::in_memory("big.bin", sample(16384 * 3 + 1, 5))]);
    tokio::spawn(sender.run(inbound));
    next_event(&sender_events).await;

    let receiver_client = SignalingClient::connect(&url).await.unwrap();
    receiver_client.join(room, None).unwrap();
    let (out, inbound) = receiver_client.into_parts();
    let (tx, events) = async_channel::unbounded();
    tokio::spawn(Coordinator::new(network.connector(), out, tx).run(inbound));

    let mut percents = Vec::new();
    loop {
        match next_event(&events).await {
            CoordinatorEvent::Progress { percent, .. } => percents.push(percent),
            CoordinatorEvent::TransferFinished { .. } => break,
            _ => {}
        }
    }
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
    assert_eq!(percents.last(), Some(&100));
    assert!(percents[0] < 100);
}

#[tokio::test]
async fn joining_a_missing_room_is_fatal() {
    let (url, handle) = start_relay().await;
    let network = MemoryNetwork::new();

    let client = SignalingClient::connect(&url).await.unwrap();
    client.join(RoomId::from("nothere1"), None).unwrap();
    let (out, inbound) = client.into_parts();
    let (tx, events) = async_channel::unbounded();

    let result = Coordinator::new(network.connector(), out, tx).run(inbound).await;

    assert!(matches!(result, Err(PeerError::RoomNotFound(id)) if id.as_str() == "nothere1"));
    assert!(matches!(next_event(&events).await, CoordinatorEvent::Fatal(_)));
    assert!(handle.list_rooms().await.unwrap().is_empty());
}

#[tokio::test]
async fn departure_is_announced_to_the_remaining_member() {
    let (url, handle) = start_relay().await;
    let room = RoomId::generate();

    let mut first = SignalingClient::connect(&url).await.unwrap();
    first.create(room.clone()).unwrap();
    let Some(Ok(ServerMessage::Joined { member_id: first_id, .. })) = first.recv().await else {
        panic!("expected joined");
    };

    let mut second = SignalingClient::connect(&url).await.unwrap();
    second.join(room.clone(), None).unwrap();
    let Some(Ok(ServerMessage::Joined { peers, .. })) = second.recv().await else {
        panic!("expected joined");
    };
    assert_eq!(peers, vec![first_id.clone()]);

    drop(first);
    let left = tokio::time::timeout(Duration::from_secs(5), second.recv())
        .await
        .expect("Timeout waiting for peer-left");
    assert!(matches!(left, Some(Ok(ServerMessage::PeerLeft { peer_id })) if peer_id == first_id));

    let rooms = handle.list_rooms().await.unwrap();
    assert_eq!(rooms[&room].len(), 1);
}
