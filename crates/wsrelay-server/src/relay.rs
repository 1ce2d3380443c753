//! The relay runtime: dial, dispatch, listen, and shut down in order.

use std::future::Future;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};
use wsrelay_core::CorrelationStore;
use wsrelay_settings::RelaySettings;
use wsrelay_upstream::{ConnectionManager, SessionTask, UpstreamConfig};

use crate::config::ServerConfig;
use crate::dispatcher::{DispatchStats, Dispatcher};
use crate::error::RelayError;
use crate::server::RelayServer;
use crate::shutdown::{self, ShutdownCoordinator};

/// Build the upstream session configuration from settings.
pub fn upstream_config(settings: &RelaySettings) -> UpstreamConfig {
    UpstreamConfig {
        keepalive_interval: settings.keepalive_interval(),
        close_grace: settings.close_grace(),
        outbound_queue: settings.upstream.outbound_queue,
        inbound_queue: settings.upstream.inbound_queue,
        ..UpstreamConfig::new(settings.upstream.endpoint.clone())
    }
}

/// A configured, not yet started relay.
pub struct Relay {
    settings: RelaySettings,
    metrics: Option<PrometheusHandle>,
}

impl Relay {
    /// Create a relay from validated settings.
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            settings,
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Connect upstream, start the dispatcher, and start listening.
    ///
    /// Returns once the listener is bound.
    pub async fn start(self) -> Result<RunningRelay, RelayError> {
        let coordinator = Arc::new(ShutdownCoordinator::new());

        let manager = ConnectionManager::new(upstream_config(&self.settings));
        let session = manager.connect(coordinator.upstream_token()).await?;
        let (handle, inbound, session_task) = session.into_parts();

        let config = ServerConfig::from_settings(&self.settings);
        let capacity = NonZeroUsize::new(config.store_capacity).unwrap_or(NonZeroUsize::MIN);
        let store = Arc::new(CorrelationStore::new(capacity));

        let dispatcher = Dispatcher::new(Arc::clone(&store));
        let dispatch_task = tokio::spawn(async move { dispatcher.run(inbound).await });

        let mut server = RelayServer::new(config, store, Arc::new(handle));
        if let Some(metrics) = self.metrics {
            server = server.with_metrics(metrics);
        }
        let listener = match server.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                coordinator.close_upstream();
                return Err(e);
            }
        };
        let local_addr = listener.local_addr().map_err(RelayError::Bind)?;
        info!(%local_addr, endpoint = manager.endpoint(), "relay listening");

        let drain_timeout = server.config().drain_timeout();
        let http_task = tokio::spawn(server.serve(listener, coordinator.token()));
        let task = tokio::spawn(supervise(
            Arc::clone(&coordinator),
            http_task,
            dispatch_task,
            session_task,
            drain_timeout,
        ));

        Ok(RunningRelay {
            local_addr,
            coordinator,
            task,
        })
    }

    /// Run until `signal` resolves or the upstream session ends.
    pub async fn run_until<F>(self, signal: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()>,
    {
        let running = self.start().await?;
        let token = running.coordinator.token();
        tokio::select! {
            () = signal => running.shutdown_now(),
            () = token.cancelled() => {}
        }
        running.wait().await
    }

    /// Run until Ctrl-C, SIGTERM, or the upstream session ends.
    pub async fn run(self) -> Result<(), RelayError> {
        self.run_until(shutdown::wait_for_signal()).await
    }
}

/// A started relay.
pub struct RunningRelay {
    local_addr: SocketAddr,
    coordinator: Arc<ShutdownCoordinator>,
    task: JoinHandle<Result<(), RelayError>>,
}

impl RunningRelay {
    /// Address the HTTP listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Begin graceful shutdown without waiting for it.
    pub fn shutdown_now(&self) {
        info!("relay shutdown requested");
        self.coordinator.shutdown();
    }

    /// Shut down and wait for every task to finish.
    pub async fn shutdown(self) -> Result<(), RelayError> {
        self.shutdown_now();
        self.wait().await
    }

    /// Wait for the relay to stop on its own.
    pub async fn wait(self) -> Result<(), RelayError> {
        self.task
            .await
            .map_err(|e| RelayError::Task(e.to_string()))?
    }
}

/// Wait for shutdown, a fatal session end, or the server exiting, then stop
/// in order: listener first so in-flight callers drain (bounded by
/// `drain_timeout`), then the upstream session.
async fn supervise(
    coordinator: Arc<ShutdownCoordinator>,
    mut http_task: JoinHandle<Result<(), RelayError>>,
    mut dispatch_task: JoinHandle<DispatchStats>,
    session_task: SessionTask,
    drain_timeout: Duration,
) -> Result<(), RelayError> {
    let token = coordinator.token();
    let mut session_lost = false;
    let exited = tokio::select! {
        () = token.cancelled() => None,
        _ = &mut dispatch_task => {
            session_lost = true;
            None
        }
        served = &mut http_task => Some(joined(served)),
    };
    if session_lost {
        error!("upstream session ended, shutting down relay");
    }
    match &exited {
        Some(Err(e)) => error!(error = %e, "HTTP server failed, shutting down relay"),
        Some(Ok(())) => warn!("HTTP server stopped, shutting down relay"),
        None => {}
    }
    coordinator.shutdown();

    let served = match exited {
        Some(served) => served,
        None => match coordinator.drain(&mut http_task, drain_timeout).await {
            Some(served) => joined(served),
            // Stalled callers were cut off; still close upstream cleanly.
            None => Ok(()),
        },
    };

    coordinator.close_upstream();
    let session_end = session_task.await;
    if !session_lost {
        let _ = dispatch_task.await;
    }

    match session_end {
        Ok(Ok(end)) => info!(?end, "upstream session closed"),
        Ok(Err(e)) => {
            error!(error = %e, "upstream session failed");
            return Err(RelayError::Connection(e));
        }
        Err(e) => warn!(error = %e, "upstream session task failed"),
    }

    if session_lost {
        return Err(RelayError::SessionEnded);
    }
    served
}

fn joined(result: Result<Result<(), RelayError>, JoinError>) -> Result<(), RelayError> {
    result.map_err(|e| RelayError::Task(e.to_string()))?
}
