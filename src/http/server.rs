//! HTTP server setup and the relay entry point.
//!
//! # Responsibilities
//! - Create Axum Router with a single catch-all handler
//! - Wire up middleware (request ID, tracing)
//! - Dispatch each request to the HTTP or WebSocket relay
//! - Forward plain requests to the upstream and stream the answer back
//! - Drain sessions on shutdown

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, FromRequestParts, State},
    http::{request::Parts, Request},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::error::RelayError;
use crate::http::headers::is_websocket_upgrade;
use crate::http::request::{build_outbound, request_id, MakeRequestUuid};
use crate::http::response::into_client_response;
use crate::net::{SessionGuard, SessionTracker};
use crate::upstream::UpstreamTarget;
use crate::websocket::{self, SessionContext};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub target: Arc<UpstreamTarget>,
    pub client: reqwest::Client,
    pub config: Arc<ProxyConfig>,
    pub sessions: SessionTracker,
    /// Flips to `true` once shutdown starts; open WebSocket sessions watch it.
    pub shutdown: watch::Receiver<bool>,
}

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
    state: AppState,
    stop_sessions: watch::Sender<bool>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// Fails if the upstream URL is unusable or the outbound client cannot be
    /// built.
    pub fn new(config: ProxyConfig) -> Result<Self, RelayError> {
        let target = Arc::new(UpstreamTarget::parse(&config.upstream.url)?);

        // Redirects are handed back to the client untouched.
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeouts.connect())
            .timeout(config.timeouts.request())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let (stop_sessions, shutdown) = watch::channel(false);
        let state = AppState {
            target,
            client,
            sessions: SessionTracker::new(config.listener.max_sessions),
            config: Arc::new(config),
            shutdown,
        };

        let router = Self::build_router(state.clone());
        Ok(Self {
            router,
            state,
            stop_sessions,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Live session tracker, shared with every handler.
    pub fn sessions(&self) -> &SessionTracker {
        &self.state.sessions
    }

    /// Run the server until `shutdown` fires, then drain open sessions.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            target = %self.state.target.base(),
            "Relay listening"
        );

        let stop_sessions = self.stop_sessions;
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, closing sessions");
                let _ = stop_sessions.send(true);
            })
            .await?;

        let grace = self.state.config.listener.shutdown_grace();
        let sessions = &self.state.sessions;
        if sessions.wait_for_drain(grace).await {
            tracing::info!("All sessions drained");
        } else {
            tracing::warn!(
                remaining = sessions.active_count(),
                grace_secs = grace.as_secs(),
                "Sessions still open after shutdown grace period"
            );
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.state.config
    }
}

/// Catch-all handler: every method, every path.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (mut parts, body) = request.into_parts();
    let request_id = request_id(&parts);

    let guard = match state.sessions.try_track() {
        Ok(guard) => guard,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Rejecting request");
            return e.into_response();
        }
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    if is_websocket_upgrade(&parts.headers) {
        return upgrade(&state, &mut parts, guard, &request_id, &path_and_query).await;
    }

    match relay_http(&state, parts, body, guard, &request_id, &path_and_query).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Proxy error");
            e.into_response()
        }
    }
}

/// Forward one plain HTTP exchange.
async fn relay_http(
    state: &AppState,
    parts: Parts,
    body: Body,
    guard: SessionGuard,
    request_id: &str,
    path_and_query: &str,
) -> Result<Response, RelayError> {
    let url = state.target.http_url(path_and_query)?;
    tracing::info!(
        request_id = %request_id,
        session = %guard.id(),
        method = %parts.method,
        url = %url,
        "Proxying request"
    );

    let started = Instant::now();
    let upstream = build_outbound(&state.client, url, &parts, body).send().await?;
    tracing::info!(
        request_id = %request_id,
        session = %guard.id(),
        status = upstream.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Upstream responded"
    );

    into_client_response(upstream, guard)
}

/// Accept a WebSocket upgrade and hand the socket to the session relay.
async fn upgrade(
    state: &AppState,
    parts: &mut Parts,
    guard: SessionGuard,
    request_id: &str,
    path_and_query: &str,
) -> Response {
    let upgrade = match WebSocketUpgrade::from_request_parts(parts, state).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            tracing::warn!(request_id = %request_id, error = %rejection, "Invalid WebSocket upgrade");
            return rejection.into_response();
        }
    };

    let upstream_url = match state.target.ws_url(path_and_query) {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Proxy error");
            return e.into_response();
        }
    };

    tracing::info!(
        request_id = %request_id,
        session = %guard.id(),
        url = %upstream_url,
        "WebSocket upgrade"
    );

    let config = &state.config;
    websocket::accept(
        upgrade,
        SessionContext {
            session: guard,
            upstream_url,
            user_agent: config.upstream.user_agent.clone(),
            connect_timeout: config.timeouts.connect(),
            idle_timeout: config.timeouts.idle(),
            settings: config.websocket.clone(),
            shutdown: state.shutdown.clone(),
        },
    )
}
