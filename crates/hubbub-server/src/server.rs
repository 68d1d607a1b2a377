//! `HubServer`: axum HTTP + WebSocket front end for the hub.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use hubbub_settings::Mode;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, UpgradeRejected};
use crate::health::{self, HealthResponse};
use crate::hub::{Hub, HubHandle};
use crate::metrics::{render, WS_UPGRADE_FAILURES_TOTAL};
use crate::session::{self, SessionConfig, SessionContext};
use crate::shutdown::ShutdownCoordinator;

/// Shared state handed to axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// What a new session needs: hub handle, tunables, tracker, shutdown.
    pub sessions: SessionContext,
    /// When the server started.
    pub start_time: Instant,
    /// Deployment mode.
    pub mode: Mode,
    /// Prometheus handle, when metrics are enabled.
    pub metrics: Option<PrometheusHandle>,
}

/// The hub plus its HTTP surface.
pub struct HubServer {
    config: ServerConfig,
    session_config: Arc<SessionConfig>,
    hub: HubHandle,
    shutdown: ShutdownCoordinator,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl HubServer {
    /// Create the server and start the hub loop.
    ///
    /// Must be called from within a tokio runtime. Pass a
    /// [`PrometheusHandle`] to expose `/metrics`.
    pub fn new(config: ServerConfig, metrics: Option<PrometheusHandle>) -> Self {
        let shutdown = ShutdownCoordinator::new();
        let (hub, handle) = Hub::new(config.request_buffer);
        let _ = shutdown.tracker().spawn(hub.run(shutdown.token()));

        Self {
            session_config: Arc::new(config.session.clone()),
            config,
            hub: handle,
            shutdown,
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the router: `/ws`, `/health` and, with metrics, `/metrics`.
    pub fn router(&self) -> Router {
        let state = AppState {
            sessions: SessionContext {
                hub: self.hub.clone(),
                config: Arc::clone(&self.session_config),
                tracker: self.shutdown.tracker().clone(),
                shutdown: self.shutdown.token(),
            },
            start_time: self.start_time,
            mode: self.config.mode,
            metrics: self.metrics.clone(),
        };

        let mut router = Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler));
        if self.metrics.is_some() {
            router = router.route("/metrics", get(metrics_handler));
        }
        let router = router
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        match self.config.mode {
            Mode::Dev => router.layer(CorsLayer::permissive()),
            Mode::Prod => router,
        }
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address and the serving task. A serve error is
    /// logged and ends the task; it is not retried.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let listener = TcpListener::bind(&self.config.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.config.addr.clone(),
                source,
            })?;
        let addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = self.shutdown.tracker().spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            match served {
                Ok(()) => info!("listener stopped"),
                Err(e) => error!(error = %e, "listener failed"),
            }
        });

        info!(%addr, mode = %self.config.mode, "hubbub listening");
        Ok((addr, handle))
    }

    /// Handle to the hub loop.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Stop accepting, close every session and wait for the drain.
    ///
    /// Returns `false` if tasks were still running at the timeout.
    pub async fn shutdown_gracefully(&self) -> bool {
        self.shutdown
            .graceful_shutdown(self.config.shutdown_timeout)
            .await
    }
}

/// GET /ws
async fn ws_handler(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            counter!(WS_UPGRADE_FAILURES_TOTAL).increment(1);
            let rejected = UpgradeRejected::from(rejection);
            debug!(status = %rejected.status(), "websocket upgrade rejected");
            return rejected.into_response();
        }
    };

    let limit = state.sessions.config.max_message_size;
    let ctx = state.sessions;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_failed_upgrade(|e| {
            counter!(WS_UPGRADE_FAILURES_TOTAL).increment(1);
            warn!(error = %e, "websocket upgrade failed");
        })
        .on_upgrade(move |socket| async move {
            if let Err(e) = session::start(socket, &ctx).await {
                warn!(error = %e, "session not started");
            }
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let snapshot = state.sessions.hub.snapshot().await.ok();
    let resp = health::health_check(state.start_time, state.mode, snapshot.as_ref());
    let status = if resp.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(resp))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
