use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedReceiver;

use share_socket::transfer::{SendOutcome, TransferOptions};
use share_socket::{ShareSocket, SocketEvent, SocketHandle};

use crate::helper::TestApp;

async fn spawn_socket(
    app: &TestApp,
    name: &str,
    client_id: &str,
    auto_accept: bool,
) -> (SocketHandle, UnboundedReceiver<SocketEvent>) {
    let config = app
        .socket_config(name)
        .client_id(client_id)
        .auto_accept(auto_accept)
        .build();
    let mut socket = ShareSocket::new(config).await.expect("socket connect failed");
    let handle = socket.handle();
    let events = socket.take_events();
    actix_rt::spawn(async move {
        let _ = socket.run().await;
    });
    (handle, events)
}

async fn next_matching<F, T>(events: &mut UnboundedReceiver<SocketEvent>, mut pick: F) -> T
where
    F: FnMut(SocketEvent) -> Option<T>,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Some(event) => {
                    if let Some(value) = pick(event) {
                        return value;
                    }
                }
                None => panic!("socket stopped before the expected event"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn test_blob(len: usize) -> Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
}

#[actix_web::test]
async fn addressed_file_transfer_reassembles_byte_for_byte() {
    let app = TestApp::spawn().await;
    let (_receiver, mut events) = spawn_socket(&app, "Bob", "b1", true).await;
    let (sender, _) = spawn_socket(&app, "Ada", "a1", true).await;

    // 600 KiB with 256 KiB chunking: 256 + 256 + 88.
    let blob = test_blob(600 * 1024);
    let outcome = sender
        .send_bytes(
            "blob.bin",
            "application/octet-stream",
            blob.clone(),
            Some("b1".to_string()),
            TransferOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, SendOutcome::Delivered);

    let mut progress = Vec::new();
    let (from, name, data) = next_matching(&mut events, |event| match event {
        SocketEvent::Progress { received, .. } => {
            progress.push(received);
            None
        }
        SocketEvent::Received { from, name, data, .. } => Some((from, name, data)),
        _ => None,
    })
    .await;

    assert_eq!(progress, vec![256 * 1024, 512 * 1024, 600 * 1024]);
    assert_eq!(from, "a1");
    assert_eq!(name, "blob.bin");
    assert_eq!(data, blob);
}

#[actix_web::test]
async fn unaccepted_offer_times_out_without_streaming() {
    let app = TestApp::spawn().await;
    let (_receiver, mut events) = spawn_socket(&app, "Bob", "b1", false).await;
    let (sender, _) = spawn_socket(&app, "Ada", "a1", true).await;

    let options = TransferOptions {
        accept_timeout: Duration::from_millis(300),
        ..TransferOptions::default()
    };
    let outcome = sender
        .send_bytes(
            "blob.bin",
            "application/octet-stream",
            test_blob(4 * 1024),
            Some("b1".to_string()),
            options,
        )
        .await
        .unwrap();
    assert_eq!(outcome, SendOutcome::NotAccepted);

    // The receiver saw the offer, but no chunk ever follows.
    next_matching(&mut events, |event| match event {
        SocketEvent::Offer { transfer_id, .. } => Some(transfer_id),
        _ => None,
    })
    .await;
    let streamed = tokio::time::timeout(Duration::from_millis(500), async {
        loop {
            match events.recv().await {
                Some(SocketEvent::Progress { .. }) | Some(SocketEvent::Received { .. }) => return,
                Some(_) => {}
                None => std::future::pending::<()>().await,
            }
        }
    })
    .await;
    assert!(streamed.is_err(), "abandoned transfer must not stream");
}

#[actix_web::test]
async fn broadcast_transfer_yields_a_copy_per_acceptor() {
    let app = TestApp::spawn().await;
    let (_b, mut b_events) = spawn_socket(&app, "Bob", "b1", true).await;
    let (_c, mut c_events) = spawn_socket(&app, "Cem", "c1", true).await;
    let (sender, _) = spawn_socket(&app, "Ada", "a1", true).await;

    let blob = test_blob(10 * 1024);
    let options = TransferOptions { chunk_size: 4 * 1024, ..TransferOptions::default() };
    // Both peers accept; the first accept unblocks the sender and the
    // duplicate is an idle no-op. Chunks go out once, every acceptor gets all.
    let outcome = sender
        .send_bytes("note.txt", "text/plain", blob.clone(), None, options)
        .await
        .unwrap();
    assert_eq!(outcome, SendOutcome::Delivered);

    for events in [&mut b_events, &mut c_events] {
        let data = next_matching(events, |event| match event {
            SocketEvent::Received { data, .. } => Some(data),
            _ => None,
        })
        .await;
        assert_eq!(data, blob);
    }
}

#[actix_web::test]
async fn manual_accept_unblocks_an_addressed_transfer() {
    let app = TestApp::spawn().await;
    let (receiver, mut events) = spawn_socket(&app, "Bob", "b1", false).await;
    let (sender, _) = spawn_socket(&app, "Ada", "a1", true).await;

    let blob = test_blob(8 * 1024);
    let expected = blob.clone();
    let send_task = actix_rt::spawn(async move {
        sender
            .send_bytes(
                "blob.bin",
                "application/octet-stream",
                blob,
                Some("b1".to_string()),
                TransferOptions::default(),
            )
            .await
    });

    let (transfer_id, from) = next_matching(&mut events, |event| match event {
        SocketEvent::Offer { transfer_id, from, .. } => Some((transfer_id, from)),
        _ => None,
    })
    .await;
    receiver.accept(&transfer_id, &from).unwrap();

    let data = next_matching(&mut events, |event| match event {
        SocketEvent::Received { data, .. } => Some(data),
        _ => None,
    })
    .await;
    assert_eq!(data, expected);
    let outcome = send_task.await.unwrap().unwrap();
    assert_eq!(outcome, SendOutcome::Delivered);
}

#[actix_web::test]
async fn identify_renames_through_the_socket() {
    let app = TestApp::spawn().await;
    let (_b, mut b_events) = spawn_socket(&app, "Bob", "b1", true).await;
    let (a, _) = spawn_socket(&app, "", "a1", true).await;

    a.identify("Ada", "").unwrap();

    next_matching(&mut b_events, |event| match event {
        SocketEvent::Peers(peers) => peers
            .iter()
            .any(|p| p.client_id == "a1" && p.name == "Ada")
            .then_some(()),
        _ => None,
    })
    .await;
}

#[actix_web::test]
async fn text_snippets_relay_to_the_room() {
    let app = TestApp::spawn().await;
    let (_b, mut b_events) = spawn_socket(&app, "Bob", "b1", true).await;
    let (sender, _) = spawn_socket(&app, "Ada", "a1", true).await;

    sender.send_text(None, "snippet for everyone").unwrap();

    let (from, from_name, content) = next_matching(&mut b_events, |event| match event {
        SocketEvent::Text { from, from_name, content } => Some((from, from_name, content)),
        _ => None,
    })
    .await;
    assert_eq!(from, "a1");
    assert_eq!(from_name, "Ada");
    assert_eq!(content, "snippet for everyone");
}
