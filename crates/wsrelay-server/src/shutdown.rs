//! Graceful shutdown coordination via `CancellationToken`.
//!
//! Shutdown runs in two phases. The listener token stops accepting callers
//! and lets in-flight requests drain; the upstream token closes the
//! session once nothing can use it any more.

use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Extra time granted beyond the request timeout for callers to drain.
pub const DRAIN_SLACK: Duration = Duration::from_secs(1);

/// Coordinates the shutdown phases of a running relay.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    upstream: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            upstream: CancellationToken::new(),
        }
    }

    /// The listener-phase token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The token that closes the upstream session.
    pub fn upstream_token(&self) -> CancellationToken {
        self.upstream.clone()
    }

    /// Initiate shutdown: stop accepting callers.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Close the upstream session.
    pub fn close_upstream(&self) {
        self.upstream.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait up to `timeout` for `handle`, aborting it if it overruns.
    ///
    /// Returns `None` when the task was aborted.
    pub async fn drain<T>(
        &self,
        handle: &mut JoinHandle<T>,
        timeout: Duration,
    ) -> Option<Result<T, JoinError>> {
        if let Ok(joined) = tokio::time::timeout(timeout, &mut *handle).await {
            Some(joined)
        } else {
            warn!("drain timed out after {timeout:?}, aborting remaining work");
            handle.abort();
            None
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve on Ctrl-C or, on Unix, SIGTERM.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                let _ = sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl-C"),
        () = terminate => info!("received SIGTERM"),
    }
}
