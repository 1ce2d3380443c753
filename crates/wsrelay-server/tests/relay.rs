//! End-to-end: HTTP callers through the relay to an in-process upstream.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use wsrelay_server::{Relay, RelayError, RunningRelay};
use wsrelay_settings::RelaySettings;
use wsrelay_upstream::ConnectionError;

/// Frames the upstream received, in order.
#[derive(Debug, PartialEq)]
enum Seen {
    Request(Value),
    Close,
}

/// Handle to a scripted upstream.
struct Upstream {
    endpoint: String,
    seen: mpsc::UnboundedReceiver<Seen>,
    push: mpsc::UnboundedSender<Message>,
}

impl Upstream {
    async fn next_seen(&mut self) -> Seen {
        tokio::time::timeout(Duration::from_secs(5), self.seen.recv())
            .await
            .expect("upstream saw nothing")
            .expect("upstream gone")
    }
}

fn reply(id: &Value, result: &Value) -> Message {
    Message::Text(json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string().into())
}

/// Scripted upstream. By `method`:
/// - `echo`: reply with `params` as the result
/// - `slow`: reply with `"late"` after `params` milliseconds
/// - `ghost`: first send a reply nobody asked for, then echo
/// - `numeric`: echo, carrying the id as a JSON number
/// - anything else: never reply
async fn spawn_upstream() -> Upstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen) = mpsc::unbounded_channel();
    let (push, mut outgoing) = mpsc::unbounded_channel::<Message>();
    let replies = push.clone();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (mut tx, mut rx) = ws.split();
        loop {
            tokio::select! {
                msg = outgoing.recv() => {
                    let Some(msg) = msg else { break };
                    if tx.send(msg).await.is_err() {
                        break;
                    }
                }
                incoming = rx.next() => {
                    let text = match incoming {
                        Some(Ok(Message::Text(text))) => text.to_string(),
                        Some(Ok(Message::Close(_))) => {
                            let _ = seen_tx.send(Seen::Close);
                            let _ = tx.flush().await;
                            break;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(_)) | None => break,
                    };
                    let request: Value = serde_json::from_str(&text).unwrap();
                    let _ = seen_tx.send(Seen::Request(request.clone()));
                    let id = request["id"].clone();
                    match request["method"].as_str() {
                        Some("echo") => {
                            let _ = replies.send(reply(&id, &request["params"]));
                        }
                        Some("slow") => {
                            let delay = request["params"].as_u64().unwrap_or(0);
                            let replies = replies.clone();
                            drop(tokio::spawn(async move {
                                tokio::time::sleep(Duration::from_millis(delay)).await;
                                let _ = replies.send(reply(&id, &json!("late")));
                            }));
                        }
                        Some("ghost") => {
                            let _ = replies.send(reply(&json!("ghost-0"), &json!("boo")));
                            let _ = replies.send(reply(&id, &request["params"]));
                        }
                        Some("numeric") => {
                            let n: u64 = id.as_str().unwrap().parse().unwrap();
                            let _ = replies.send(reply(&json!(n), &request["params"]));
                        }
                        _ => {}
                    }
                }
            }
        }
    });

    Upstream {
        endpoint: format!("ws://{addr}"),
        seen,
        push,
    }
}

fn settings(endpoint: &str, timeout_ms: u64) -> RelaySettings {
    let mut settings = RelaySettings::default();
    settings.server.host = "127.0.0.1".into();
    settings.server.port = 0;
    settings.upstream.endpoint = endpoint.into();
    settings.upstream.close_grace_ms = 500;
    settings.relay.request_timeout_ms = timeout_ms;
    settings
}

async fn start(upstream: &Upstream, timeout_ms: u64) -> RunningRelay {
    Relay::new(settings(&upstream.endpoint, timeout_ms))
        .start()
        .await
        .unwrap()
}

async fn post(addr: SocketAddr, body: &str) -> (u16, String) {
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/"))
        .header("content-type", "application/json")
        .body(body.to_owned())
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.text().await.unwrap())
}

#[tokio::test]
async fn happy_path_restores_caller_id() {
    let mut upstream = spawn_upstream().await;
    let relay = start(&upstream, 3_000).await;

    let (status, body) = post(relay.local_addr(), r#"{"id":1,"method":"echo","params":"bar"}"#).await;
    assert_eq!(status, 200);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["id"], json!(1));
    assert_eq!(body["result"], "bar");

    let Seen::Request(sent) = upstream.next_seen().await else {
        panic!("expected request");
    };
    assert!(sent["id"].is_string());
    assert_eq!(sent["params"], "bar");

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn id_types_round_trip() {
    let upstream = spawn_upstream().await;
    let relay = start(&upstream, 3_000).await;
    let addr = relay.local_addr();

    let (_, body) = post(addr, r#"{"id":"abc","method":"echo","params":1}"#).await;
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["id"], json!("abc"));

    let (_, body) = post(addr, r#"{"id":0,"method":"echo","params":1}"#).await;
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["id"], json!(0));

    let (status, body) = post(addr, r#"{"id":5,"method":"numeric","params":"n"}"#).await;
    assert_eq!(status, 200);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["id"], json!(5));
    assert_eq!(body["result"], "n");

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn colliding_caller_ids_get_their_own_replies() {
    let upstream = spawn_upstream().await;
    let relay = start(&upstream, 3_000).await;
    let addr = relay.local_addr();

    let mut calls = Vec::new();
    for i in 0..25 {
        calls.push(tokio::spawn(async move {
            let body = json!({"id": 1, "method": "echo", "params": i}).to_string();
            (i, post(addr, &body).await)
        }));
    }
    for call in calls {
        let (i, (status, body)) = call.await.unwrap();
        assert_eq!(status, 200);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["id"], json!(1));
        assert_eq!(body["result"], json!(i));
    }

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn timeout_then_late_reply_is_dropped() {
    let upstream = spawn_upstream().await;
    let relay = start(&upstream, 200).await;
    let addr = relay.local_addr();

    let (status, body) = post(addr, r#"{"id":1,"method":"slow","params":500}"#).await;
    assert_eq!(status, 503);
    assert_eq!(body, "upstream reply timed out");

    tokio::time::sleep(Duration::from_millis(500)).await;

    let (status, body) = post(addr, r#"{"id":2,"method":"echo","params":"after"}"#).await;
    assert_eq!(status, 200);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["result"], "after");

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn unmatched_reply_does_not_stop_dispatch() {
    let upstream = spawn_upstream().await;
    let relay = start(&upstream, 3_000).await;
    let addr = relay.local_addr();

    let (status, body) = post(addr, r#"{"id":1,"method":"ghost","params":"real"}"#).await;
    assert_eq!(status, 200);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["result"], "real");

    upstream.push.send(Message::Text("not json".into())).unwrap();
    let (status, _) = post(addr, r#"{"id":2,"method":"echo","params":"still"}"#).await;
    assert_eq!(status, 200);

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn malformed_request_is_not_forwarded() {
    let mut upstream = spawn_upstream().await;
    let relay = start(&upstream, 3_000).await;
    let addr = relay.local_addr();

    for body in ["{", "42", r#"{"method":"echo"}"#, r#"{"id":null,"method":"echo"}"#] {
        let (status, text) = post(addr, body).await;
        assert_eq!(status, 400, "body {body}");
        assert_eq!(text, "Invalid jsonrpc request");
    }

    let (status, _) = post(addr, r#"{"id":9,"method":"echo","params":"first"}"#).await;
    assert_eq!(status, 200);
    let Seen::Request(first) = upstream.next_seen().await else {
        panic!("expected request");
    };
    assert_eq!(first["params"], "first");

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn other_routes_are_not_found() {
    let upstream = spawn_upstream().await;
    let relay = start(&upstream, 3_000).await;
    let addr = relay.local_addr();
    let client = reqwest::Client::new();

    let resp = client.get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    let resp = client
        .post(format!("http://{addr}/other"))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn health_reports_connected_upstream() {
    let upstream = spawn_upstream().await;
    let relay = start(&upstream, 3_000).await;

    let health: Value = reqwest::get(format!("http://{}/health", relay.local_addr()))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["upstream"], "connected");
    assert_eq!(health["store_capacity"], 100);

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn racing_replies_resolve_exactly_once() {
    let upstream = spawn_upstream().await;
    let relay = start(&upstream, 100).await;
    let addr = relay.local_addr();

    let mut calls = Vec::new();
    for delay in (80..120).step_by(2) {
        calls.push(tokio::spawn(async move {
            let body = json!({"id": delay, "method": "slow", "params": delay}).to_string();
            post(addr, &body).await
        }));
    }
    for call in calls {
        let (status, body) = call.await.unwrap();
        match status {
            200 => assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["result"], "late"),
            503 => assert_eq!(body, "upstream reply timed out"),
            other => panic!("unexpected status {other}"),
        }
    }

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_closes_upstream() {
    let mut upstream = spawn_upstream().await;
    let relay = start(&upstream, 3_000).await;

    relay.shutdown().await.unwrap();
    assert_eq!(upstream.next_seen().await, Seen::Close);
}

#[tokio::test]
async fn shutdown_is_bounded_with_stalled_caller() {
    let mut upstream = spawn_upstream().await;
    let mut settings = settings(&upstream.endpoint, 500);
    settings.upstream.close_grace_ms = 200;
    let relay = Relay::new(settings).start().await.unwrap();

    // Promise a body and never finish it.
    let mut stalled = TcpStream::connect(relay.local_addr()).await.unwrap();
    stalled
        .write_all(
            b"POST / HTTP/1.1\r\nHost: relay\r\nContent-Type: application/json\r\n\
              Content-Length: 100\r\n\r\n{\"id\":1",
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let result = tokio::time::timeout(Duration::from_secs(5), relay.shutdown())
        .await
        .expect("shutdown hung on a stalled caller");
    assert!(result.is_ok(), "got {result:?}");
    assert_eq!(upstream.next_seen().await, Seen::Close);
    drop(stalled);
}

#[tokio::test]
async fn upstream_close_stops_relay() {
    let upstream = spawn_upstream().await;
    let relay = start(&upstream, 3_000).await;

    upstream.push.send(Message::Close(None)).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), relay.wait())
        .await
        .unwrap();
    assert!(matches!(result, Err(RelayError::SessionEnded)), "got {result:?}");
}

#[tokio::test]
async fn dial_failure_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = Relay::new(settings(&format!("ws://{addr}"), 3_000)).start().await;
    assert!(matches!(
        result,
        Err(RelayError::Connection(ConnectionError::Dial { .. }))
    ));
}
