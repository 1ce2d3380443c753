//! Dialing the upstream and the handles a live session hands out.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::connect_async;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use wsrelay_core::{Outbound, SendError};

use crate::config::UpstreamConfig;
use crate::error::{ConnectionError, SessionEnd};
use crate::session::{self, OutboundFrame, SessionTimings};

/// Stream of text frames received from the upstream, in arrival order.
/// Ends when the session ends.
pub type InboundMessages = ReceiverStream<String>;

/// Join handle of the session task.
pub type SessionTask = JoinHandle<Result<SessionEnd, ConnectionError>>;

/// Dials the configured upstream endpoint.
#[derive(Clone, Debug)]
pub struct ConnectionManager {
    config: UpstreamConfig,
}

impl ConnectionManager {
    /// Create a manager for `config`.
    pub fn new(config: UpstreamConfig) -> Self {
        Self { config }
    }

    /// The endpoint this manager dials.
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Open the session. Cancelling `cancel` closes it gracefully.
    #[instrument(skip_all, fields(endpoint = %self.config.endpoint))]
    pub async fn connect(
        &self,
        cancel: CancellationToken,
    ) -> Result<UpstreamSession, ConnectionError> {
        let dial = |reason: String| ConnectionError::Dial {
            endpoint: self.config.endpoint.clone(),
            reason,
        };

        let (ws, _response) = tokio::time::timeout(
            self.config.connect_timeout,
            connect_async(self.config.endpoint.as_str()),
        )
        .await
        .map_err(|_| dial(format!("timed out after {:?}", self.config.connect_timeout)))?
        .map_err(|e| dial(e.to_string()))?;

        info!("upstream connected");

        let (frame_tx, frame_rx) = mpsc::channel(self.config.outbound_queue.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.inbound_queue.max(1));
        let open = Arc::new(AtomicBool::new(true));

        let timings = SessionTimings {
            keepalive_interval: self.config.keepalive_interval,
            close_grace: self.config.close_grace,
        };
        let task = tokio::spawn(session::run_session(
            ws,
            frame_rx,
            inbound_tx,
            timings,
            cancel,
            Arc::clone(&open),
        ));

        Ok(UpstreamSession {
            handle: UpstreamHandle {
                frames: frame_tx,
                open,
            },
            inbound: ReceiverStream::new(inbound_rx),
            task,
        })
    }
}

/// A live upstream session.
#[derive(Debug)]
pub struct UpstreamSession {
    handle: UpstreamHandle,
    inbound: InboundMessages,
    task: SessionTask,
}

impl UpstreamSession {
    /// A send handle for this session.
    pub fn handle(&self) -> UpstreamHandle {
        self.handle.clone()
    }

    /// Split into the send handle, the inbound stream and the task.
    pub fn into_parts(self) -> (UpstreamHandle, InboundMessages, SessionTask) {
        (self.handle, self.inbound, self.task)
    }
}

/// Cloneable send path into the session task.
#[derive(Clone, Debug)]
pub struct UpstreamHandle {
    frames: mpsc::Sender<OutboundFrame>,
    open: Arc<AtomicBool>,
}

impl UpstreamHandle {
    /// Queue `text` and wait until it has been written to the socket.
    pub async fn send(&self, text: String) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        let (ack, written) = oneshot::channel();
        self.frames
            .send(OutboundFrame { text, ack })
            .await
            .map_err(|_| SendError::Closed)?;
        written.await.map_err(|_| SendError::Closed)?
    }

    /// Whether the session task is still running.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.frames.is_closed()
    }
}

#[async_trait]
impl Outbound for UpstreamHandle {
    async fn send_text(&self, text: String) -> Result<(), SendError> {
        self.send(text).await
    }

    fn is_open(&self) -> bool {
        UpstreamHandle::is_open(self)
    }
}

impl std::fmt::Debug for OutboundFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundFrame")
            .field("len", &self.text.len())
            .finish_non_exhaustive()
    }
}
