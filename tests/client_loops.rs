mod common;

use std::sync::Arc;
use std::time::Duration;

use location_relay::{
    client::LocationClient,
    geolocation::FixedPosition,
    models::{Coordinates, RoomCode},
    receiver::{Receiver, ReceiverStatus},
    sender::{Sender, SenderStatus},
};

const INTERVAL: Duration = Duration::from_millis(50);

fn client(addr: std::net::SocketAddr) -> Arc<LocationClient> {
    Arc::new(LocationClient::with_client(
        reqwest::Client::new(),
        &common::base_url(addr),
    ))
}

#[tokio::test]
async fn test_receiver_follows_sender() {
    let (addr, store) = common::spawn_relay().await;

    let mut sender = Sender::new(client(addr), INTERVAL);
    sender
        .locate(&FixedPosition(Coordinates::new(60.17, 24.94)))
        .await
        .unwrap();
    let code = sender.generate_room_code().clone();
    sender.send().await.unwrap();

    let mut receiver = Receiver::new(client(addr), INTERVAL);
    let first = receiver.submit(code.as_str()).await.unwrap();
    assert_eq!(first.coordinates(), Coordinates::new(60.17, 24.94));

    tokio::time::sleep(INTERVAL * 6).await;

    let snapshot = receiver.snapshot();
    assert_eq!(snapshot.status, ReceiverStatus::Polling);
    let latest = snapshot.reading.unwrap();
    assert_eq!(latest.coordinates(), Coordinates::new(60.17, 24.94));
    assert!(latest.timestamp > first.timestamp);
    assert!(matches!(
        sender.status(),
        SenderStatus::PollingUpdates { updates } if updates > 0
    ));

    // Updates mutate the single record instead of adding rows
    assert_eq!(store.len().await, 1);

    sender.stop().await;
    receiver.clear().await;
    assert_eq!(receiver.snapshot().status, ReceiverStatus::AwaitingCode);
}

#[tokio::test]
async fn test_receiver_stops_on_unknown_room() {
    let (addr, _) = common::spawn_relay().await;
    let mut receiver = Receiver::new(client(addr), INTERVAL);

    assert!(receiver.submit("NOPE").await.is_err());
    assert_eq!(
        receiver.snapshot().status,
        ReceiverStatus::Stopped("Location with the given room code not found.".to_string())
    );
}

#[tokio::test]
async fn test_sender_fails_when_relay_unreachable() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut sender = Sender::new(client(addr), INTERVAL);
    sender
        .locate(&FixedPosition(Coordinates::new(1.0, 2.0)))
        .await
        .unwrap();
    sender.set_room_code(RoomCode::try_from("OFFLINE").unwrap());

    assert!(sender.send().await.is_err());
    assert!(matches!(sender.status(), SenderStatus::Failed(_)));
}
