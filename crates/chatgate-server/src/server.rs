//! `GatewayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use chatgate_core::ids::ConnectionId;
use chatgate_core::{ChannelError, ChannelKey};
use chrono::{DateTime, Utc};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::dispatch::{Dispatcher, OperationTable};
use crate::health::{self, HealthResponse};
use crate::metrics::{WS_CONNECTIONS_REJECTED_TOTAL, render};
use crate::services::Services;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{
    Broadcaster, ConnectionRegistry, LifecycleHook, SessionContext, run_ws_session,
};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Everything a session needs.
    pub session: SessionContext,
    /// When the server started.
    pub start_time: Instant,
    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,
    /// Prometheus handle for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
    /// One permit per admissible connection, held for the session's lifetime.
    pub slots: Arc<Semaphore>,
}

/// The gateway server.
pub struct GatewayServer {
    config: Arc<ServerConfig>,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<Dispatcher>,
    lifecycle: Arc<LifecycleHook>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    slots: Arc<Semaphore>,
    start_time: Instant,
    started_at: DateTime<Utc>,
}

impl GatewayServer {
    /// Wire registry, dispatcher and lifecycle hook around `services`.
    pub fn new(config: ServerConfig, services: &Services) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(
            Arc::clone(&registry),
            config.max_dropped_messages,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            OperationTable::from_services(services),
            broadcaster,
            config.handler_timeout(),
        ));
        let lifecycle = Arc::new(LifecycleHook::new(
            Arc::clone(&registry),
            Arc::clone(&services.chat),
            Arc::clone(&services.sync),
            config.summary_message_count,
        ));
        let slots = Arc::new(Semaphore::new(config.max_connections.min(Semaphore::MAX_PERMITS)));
        Self {
            config: Arc::new(config),
            registry,
            dispatcher,
            lifecycle,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: None,
            slots,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            session: SessionContext {
                registry: Arc::clone(&self.registry),
                dispatcher: Arc::clone(&self.dispatcher),
                lifecycle: Arc::clone(&self.lifecycle),
                shutdown: self.shutdown.token(),
                config: Arc::clone(&self.config),
            },
            start_time: self.start_time,
            started_at: self.started_at,
            metrics: self.metrics.clone(),
            slots: Arc::clone(&self.slots),
        };

        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/ws/{family}", get(ws_family_handler))
            .route("/ws/{family}/", get(ws_family_handler))
            .route("/ws/{family}/{sub_id}", get(ws_channel_handler));
        if self.metrics.is_some() {
            router = router.route("/metrics", get(metrics_handler));
        }
        router
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown is signalled.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%addr, "gateway listening");
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
            {
                warn!(error = %e, "server error");
            }
        });
        Ok((addr, handle))
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = &state.session.registry;
    Json(health::health_check(
        state.start_time,
        state.started_at,
        registry.connection_count(),
        registry.channel_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /ws/{family} and /ws/{family}/
async fn ws_family_handler(
    Path(family): Path<String>,
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    accept(&family, None, state, upgrade)
}

/// GET /ws/{family}/{sub_id}
async fn ws_channel_handler(
    Path((family, sub_id)): Path<(String, String)>,
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    accept(&family, Some(&sub_id), state, upgrade)
}

/// Validate the path, enforce the connection limit, then upgrade.
fn accept(
    family: &str,
    sub_id: Option<&str>,
    state: AppState,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let channel = match ChannelKey::from_path(family, sub_id) {
        Ok(channel) => channel,
        Err(e @ ChannelError::UnknownFamily(_)) => {
            debug!(error = %e, "rejecting upgrade");
            return (StatusCode::NOT_FOUND, e.to_string()).into_response();
        }
        Err(e @ ChannelError::MissingSubId(_)) => {
            debug!(error = %e, "rejecting upgrade");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let Ok(slot) = Arc::clone(&state.slots).try_acquire_owned() else {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(%channel, limit = state.session.config.max_connections, "connection limit reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    let conn_id = ConnectionId::new();
    let ctx = state.session;
    ws.max_message_size(ctx.config.max_message_size)
        .on_upgrade(move |socket| async move {
            run_ws_session(socket, conn_id, channel, ctx).await;
            drop(slot);
        })
}
