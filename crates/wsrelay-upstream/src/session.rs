//! The session task: sole owner of the upstream socket.
//!
//! Every write (caller frames, keepalive pings, the close frame) happens on
//! this one task, so frames can never interleave on the wire.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use wsrelay_core::SendError;

use crate::error::{ConnectionError, SessionEnd};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Payload carried by keepalive pings.
const KEEPALIVE_PAYLOAD: &[u8] = b"keepalive";

/// A frame queued for the session task, with its write acknowledgment.
pub(crate) struct OutboundFrame {
    pub(crate) text: String,
    pub(crate) ack: oneshot::Sender<Result<(), SendError>>,
}

/// Timing knobs the task needs.
pub(crate) struct SessionTimings {
    pub(crate) keepalive_interval: Duration,
    pub(crate) close_grace: Duration,
}

/// Drive the session until shutdown, peer close, or an I/O failure.
pub(crate) async fn run_session(
    ws: WsStream,
    mut frames: mpsc::Receiver<OutboundFrame>,
    inbound: mpsc::Sender<String>,
    timings: SessionTimings,
    cancel: CancellationToken,
    open: Arc<AtomicBool>,
) -> Result<SessionEnd, ConnectionError> {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let mut keepalive = time::interval_at(
        Instant::now() + timings.keepalive_interval,
        timings.keepalive_interval,
    );
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let result = loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("shutdown requested, closing upstream session");
                break close_gracefully(&mut ws_tx, &mut ws_rx, timings.close_grace).await;
            }
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    debug!("all upstream handles dropped, closing session");
                    break close_gracefully(&mut ws_tx, &mut ws_rx, timings.close_grace).await;
                };
                let written = ws_tx
                    .send(Message::Text(frame.text.into()))
                    .await
                    .map_err(|e| e.to_string());
                let _ = frame.ack.send(written.clone().map_err(SendError::Io));
                if let Err(reason) = written {
                    warn!(error = %reason, "upstream write failed");
                    break Err(ConnectionError::Io(reason));
                }
            }
            _ = keepalive.tick() => {
                if let Err(e) = ws_tx.send(Message::Ping(KEEPALIVE_PAYLOAD.to_vec().into())).await {
                    warn!(error = %e, "keepalive write failed");
                    break Err(ConnectionError::Keepalive(e.to_string()));
                }
                trace!("keepalive sent");
            }
            msg = ws_rx.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text.to_string(),
                    Some(Ok(Message::Binary(data))) => {
                        if let Ok(s) = std::str::from_utf8(&data) {
                            s.to_string()
                        } else {
                            debug!(len = data.len(), "dropping non-UTF8 binary frame");
                            continue;
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                        trace!("control frame received");
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "upstream sent close frame");
                        break Ok(SessionEnd::PeerClosed);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "upstream read failed");
                        break Err(ConnectionError::Io(e.to_string()));
                    }
                    None => break Err(ConnectionError::Closed),
                };
                trace!(len = text.len(), "upstream frame received");
                if inbound.send(text).await.is_err() {
                    debug!("inbound consumer gone, closing session");
                    break close_gracefully(&mut ws_tx, &mut ws_rx, timings.close_grace).await;
                }
            }
        }
    };

    open.store(false, Ordering::Release);
    frames.close();
    while let Ok(frame) = frames.try_recv() {
        let _ = frame.ack.send(Err(SendError::Closed));
    }
    result
}

/// Send a normal-closure close frame, then wait up to `grace` for the peer
/// to finish the handshake. The socket is released either way.
async fn close_gracefully(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsSource,
    grace: Duration,
) -> Result<SessionEnd, ConnectionError> {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "relay shutting down".into(),
    };
    if let Err(e) = ws_tx.send(Message::Close(Some(frame))).await {
        warn!(error = %e, "failed to send close frame");
        return Ok(SessionEnd::Shutdown);
    }

    let acknowledged = time::timeout(grace, async {
        while let Some(Ok(msg)) = ws_rx.next().await {
            if msg.is_close() {
                break;
            }
        }
    })
    .await;
    if acknowledged.is_err() {
        debug!(?grace, "peer did not acknowledge close in time");
    }
    Ok(SessionEnd::Shutdown)
}
