//! `RelayServer`: the caller-facing axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use wsrelay_core::{CorrelationStore, IdGenerator, Outbound};

use crate::config::ServerConfig;
use crate::error::RelayError;
use crate::health::{self, HealthResponse};
use crate::ingress;
use crate::metrics;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Pending requests keyed by correlation id.
    pub store: Arc<CorrelationStore>,
    /// Correlation id source.
    pub ids: Arc<IdGenerator>,
    /// Send path to the upstream session.
    pub outbound: Arc<dyn Outbound>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The caller-facing relay server.
pub struct RelayServer {
    state: AppState,
}

impl RelayServer {
    /// Create a server that relays through `outbound` and parks callers in `store`.
    pub fn new(
        config: ServerConfig,
        store: Arc<CorrelationStore>,
        outbound: Arc<dyn Outbound>,
    ) -> Self {
        Self {
            state: AppState {
                store,
                ids: Arc::new(IdGenerator::new()),
                outbound,
                config: Arc::new(config),
                start_time: Instant::now(),
                metrics: None,
            },
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", post(ingress::relay).fallback(not_found))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .fallback(not_found)
            .with_state(self.state.clone())
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Get the correlation store.
    pub fn store(&self) -> &Arc<CorrelationStore> {
        &self.state.store
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, RelayError> {
        TcpListener::bind(self.config().bind_addr())
            .await
            .map_err(RelayError::Bind)
    }

    /// Serve on `listener` until `shutdown` fires and in-flight requests drain.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), RelayError> {
        let app = self.router();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(RelayError::Serve)?;
        info!("HTTP server stopped");
        Ok(())
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.store.len(),
        state.store.capacity(),
        state.outbound.is_open(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
