//! Session behavior against an in-process WebSocket peer.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use wsrelay_core::{Outbound, SendError};
use wsrelay_upstream::{ConnectionError, ConnectionManager, SessionEnd, UpstreamConfig};

/// What the peer saw, in order.
#[derive(Debug, PartialEq, Eq)]
enum Seen {
    Text(String),
    Ping,
    Close,
}

/// Start a peer that accepts one connection, reports every frame it
/// receives, and sends whatever arrives on the returned sender.
async fn spawn_peer() -> (String, mpsc::UnboundedReceiver<Seen>, mpsc::UnboundedSender<Message>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<Message>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (mut tx, mut rx) = ws.split();
        loop {
            tokio::select! {
                outgoing = push_rx.recv() => {
                    let Some(msg) = outgoing else { break };
                    if tx.send(msg).await.is_err() {
                        break;
                    }
                }
                incoming = rx.next() => {
                    match incoming {
                        Some(Ok(Message::Text(t))) => {
                            let _ = seen_tx.send(Seen::Text(t.to_string()));
                        }
                        Some(Ok(Message::Ping(_))) => {
                            let _ = seen_tx.send(Seen::Ping);
                        }
                        Some(Ok(Message::Close(_))) => {
                            let _ = seen_tx.send(Seen::Close);
                            // tungstenite queues the close reply; flush it.
                            let _ = tx.flush().await;
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(_)) | None => break,
                    }
                }
            }
        }
    });

    (format!("ws://{addr}"), seen_rx, push_tx)
}

fn config(endpoint: &str) -> UpstreamConfig {
    let mut cfg = UpstreamConfig::new(endpoint);
    cfg.keepalive_interval = Duration::from_secs(60);
    cfg.close_grace = Duration::from_millis(500);
    cfg
}

async fn next_text(seen: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    loop {
        let item = tokio::time::timeout(Duration::from_secs(5), seen.recv())
            .await
            .expect("peer timed out")
            .expect("peer gone");
        if item != Seen::Ping {
            return item;
        }
    }
}

#[tokio::test]
async fn frames_flow_both_ways() {
    let (endpoint, mut seen, push) = spawn_peer().await;
    let manager = ConnectionManager::new(config(&endpoint));
    let session = manager.connect(CancellationToken::new()).await.unwrap();
    let (handle, mut inbound, _task) = session.into_parts();

    handle.send(r#"{"id":"1","method":"foo"}"#.into()).await.unwrap();
    assert_eq!(
        next_text(&mut seen).await,
        Seen::Text(r#"{"id":"1","method":"foo"}"#.into())
    );

    push.send(Message::Text(r#"{"id":"1","result":"bar"}"#.into())).unwrap();
    let got = tokio::time::timeout(Duration::from_secs(5), inbound.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got, r#"{"id":"1","result":"bar"}"#);
}

#[tokio::test]
async fn concurrent_sends_arrive_whole() {
    let (endpoint, mut seen, _push) = spawn_peer().await;
    let manager = ConnectionManager::new(config(&endpoint));
    let session = manager.connect(CancellationToken::new()).await.unwrap();
    let handle = session.handle();

    let mut sends = Vec::new();
    for i in 0..20 {
        let h = handle.clone();
        sends.push(tokio::spawn(async move {
            h.send_text(format!(r#"{{"id":"{i}","method":"m"}}"#)).await
        }));
    }
    for send in sends {
        send.await.unwrap().unwrap();
    }

    let mut ids = Vec::new();
    for _ in 0..20 {
        let Seen::Text(text) = next_text(&mut seen).await else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        ids.push(value["id"].as_str().unwrap().parse::<u32>().unwrap());
    }
    ids.sort_unstable();
    assert_eq!(ids, (0..20).collect::<Vec<_>>());
}

#[tokio::test]
async fn keepalive_pings_are_sent() {
    let (endpoint, mut seen, _push) = spawn_peer().await;
    let mut cfg = config(&endpoint);
    cfg.keepalive_interval = Duration::from_millis(50);
    let session = ConnectionManager::new(cfg)
        .connect(CancellationToken::new())
        .await
        .unwrap();

    let mut pings = 0;
    while pings < 2 {
        let item = tokio::time::timeout(Duration::from_secs(5), seen.recv())
            .await
            .unwrap()
            .unwrap();
        if item == Seen::Ping {
            pings += 1;
        }
    }
    assert!(session.handle().is_open());
}

#[tokio::test]
async fn cancel_sends_close_frame() {
    let (endpoint, mut seen, _push) = spawn_peer().await;
    let cancel = CancellationToken::new();
    let session = ConnectionManager::new(config(&endpoint))
        .connect(cancel.clone())
        .await
        .unwrap();
    let (handle, mut inbound, task) = session.into_parts();

    cancel.cancel();
    assert_eq!(next_text(&mut seen).await, Seen::Close);

    let end = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(end, Ok(SessionEnd::Shutdown));
    assert!(inbound.next().await.is_none());
    assert!(!handle.is_open());
    assert_eq!(handle.send("late".into()).await, Err(SendError::Closed));
}

#[tokio::test]
async fn peer_close_ends_session() {
    let (endpoint, _seen, push) = spawn_peer().await;
    let session = ConnectionManager::new(config(&endpoint))
        .connect(CancellationToken::new())
        .await
        .unwrap();
    let (handle, mut inbound, task) = session.into_parts();

    push.send(Message::Close(None)).unwrap();

    let end = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(end, Ok(SessionEnd::PeerClosed));
    assert!(inbound.next().await.is_none());
    assert_eq!(handle.send_text("late".into()).await, Err(SendError::Closed));
}

#[tokio::test]
async fn utf8_binary_frames_are_forwarded() {
    let (endpoint, _seen, push) = spawn_peer().await;
    let session = ConnectionManager::new(config(&endpoint))
        .connect(CancellationToken::new())
        .await
        .unwrap();
    let (_handle, mut inbound, _task) = session.into_parts();

    push.send(Message::Binary(vec![0xff, 0xfe].into())).unwrap();
    push.send(Message::Binary(br#"{"id":"9"}"#.to_vec().into())).unwrap();

    let got = tokio::time::timeout(Duration::from_secs(5), inbound.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got, r#"{"id":"9"}"#);
}

#[tokio::test]
async fn dial_failure_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let manager = ConnectionManager::new(config(&format!("ws://{addr}")));
    assert_eq!(manager.endpoint(), format!("ws://{addr}"));
    let err = manager.connect(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ConnectionError::Dial { .. }), "got {err:?}");
}
