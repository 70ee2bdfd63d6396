//! `LinkServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::http::{Method, header};
use axum::response::Json;
use axum::routing::{get, post};
use linkpush_store::{SessionRegistry, ShortcodeStore};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::delivery::DeliveryEngine;
use crate::handlers::{redirect, submit_url};
use crate::health::{self, HealthResponse};
use crate::metrics::SESSIONS_EVICTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::ws_handler;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// URL ↔ shortcode table.
    pub shortcodes: Arc<ShortcodeStore>,
    /// Session rows and bound channels.
    pub sessions: Arc<SessionRegistry>,
    /// Push delivery.
    pub delivery: Arc<DeliveryEngine>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The linkpush server.
pub struct LinkServer {
    config: Arc<ServerConfig>,
    shortcodes: Arc<ShortcodeStore>,
    sessions: Arc<SessionRegistry>,
    delivery: Arc<DeliveryEngine>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl LinkServer {
    /// Create a new server with empty stores.
    pub fn new(config: ServerConfig) -> Self {
        let shortcodes = ShortcodeStore::new(config.code_length);
        Self::with_shortcodes(config, shortcodes)
    }

    /// Create a server over a caller-built shortcode store.
    pub fn with_shortcodes(config: ServerConfig, shortcodes: ShortcodeStore) -> Self {
        let sessions = Arc::new(SessionRegistry::new());
        let delivery = Arc::new(DeliveryEngine::new(
            Arc::clone(&sessions),
            config.retry_policy(),
        ));
        Self {
            config: Arc::new(config),
            shortcodes: Arc::new(shortcodes),
            sessions,
            delivery,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    fn state(&self, config: Arc<ServerConfig>) -> AppState {
        AppState {
            config,
            shortcodes: Arc::clone(&self.shortcodes),
            sessions: Arc::clone(&self.sessions),
            delivery: Arc::clone(&self.delivery),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        self.router_with(Arc::clone(&self.config))
    }

    fn router_with(&self, config: Arc<ServerConfig>) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .route("/url", post(submit_url))
            .route("/{short_code}", get(redirect))
            .with_state(self.state(config))
            .layer(cors_layer())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve until shutdown.
    ///
    /// Returns the bound address and a handle that completes once the HTTP
    /// server has stopped. The serve loop, the sweeper and every WebSocket
    /// session are tracked by the [`ShutdownCoordinator`]. Without an
    /// explicit public base URL, links carry the bound port.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let bind = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&bind).await?;
        let addr = listener.local_addr()?;

        let mut bound = ServerConfig::clone(&self.config);
        bound.port = addr.port();
        info!(%addr, base_url = %bound.base_url(), "linkpush server listening");

        let token = self.shutdown.token();
        if let Some(ttl) = self.config.session_ttl() {
            let every = Duration::from_secs(self.config.sweep_interval_secs.max(1));
            let _ = self.shutdown.spawn(sweep_idle_sessions(
                Arc::clone(&self.sessions),
                ttl,
                every,
                token.clone(),
            ));
        }

        let router = self.router_with(Arc::new(bound));
        let handle = self.shutdown.spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server error");
            }
            info!("server stopped");
        });

        Ok((addr, handle))
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the shortcode store.
    pub fn shortcodes(&self) -> &Arc<ShortcodeStore> {
        &self.shortcodes
    }

    /// Get the session registry.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Get the delivery engine.
    pub fn delivery(&self) -> &Arc<DeliveryEngine> {
        &self.delivery
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }
}

/// Any origin; `GET`/`POST`; `Content-Type` and `Authorization` headers.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Evict idle disconnected sessions every `every` until cancelled.
async fn sweep_idle_sessions(
    sessions: Arc<SessionRegistry>,
    ttl: Duration,
    every: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    // Skip the immediate first tick
    let _ = ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = sessions.evict_idle(ttl);
                if evicted > 0 {
                    counter!(SESSIONS_EVICTED_TOTAL)
                        .increment(u64::try_from(evicted).unwrap_or(u64::MAX));
                    info!(evicted, remaining = sessions.len(), "evicted idle sessions");
                }
            }
            () = token.cancelled() => break,
        }
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.sessions.connected_count(),
        state.sessions.len(),
        state.shortcodes.len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(state.metrics.as_ref())
}
