//! HTTP server wiring: shared state, router, and the serve loop.

use crate::auth::{Credentials, require_basic_auth};
use crate::binary::AgentBinary;
use crate::handlers;
use anyhow::{Context, Result};
use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use claude_gateway_core::{Gateway, GatewayConfig};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Everything a running server needs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port` to listen on. Port 0 picks a free port.
    pub bind_addr: String,
    pub credentials: Credentials,
    pub agent: AgentBinary,
    /// Longest accepted agent output line.
    pub max_line_bytes: usize,
}

/// Shared handler state.
#[derive(Debug)]
pub struct AppState {
    pub gateway: Gateway,
    pub credentials: Credentials,
    pub agent: AgentBinary,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        let mut gateway_config = GatewayConfig::new(&config.agent.path);
        gateway_config.max_line_bytes = config.max_line_bytes;
        Self {
            gateway: Gateway::new(gateway_config),
            credentials: config.credentials.clone(),
            agent: config.agent.clone(),
        }
    }
}

/// Any origin may call in; credentials still gate everything that matters.
fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}

/// Routes, with Basic auth applied to everything except `/`, `/docs` and `/health`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/chat", post(handlers::chat))
        .route("/chat/{process_id}", delete(handlers::cancel_chat))
        .route("/processes", get(handlers::list_processes))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_basic_auth,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/docs", get(handlers::docs))
        .route("/health", get(handlers::health))
        .merge(protected)
        .layer(build_cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until SIGINT/SIGTERM.
///
/// Running invocations are cancelled as soon as the signal arrives: their SSE
/// responses only end once the agent does, and graceful shutdown waits for
/// open responses.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let state = Arc::new(AppState::new(&config));
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    let local_addr = listener
        .local_addr()
        .context("Failed to get local addr")?;

    info!("Claude Code API Gateway listening on http://{}", local_addr);
    info!("Chat endpoint (POST, SSE): http://{}/chat", local_addr);
    if !local_addr.ip().is_loopback() {
        warn!(
            "Gateway bound to non-loopback address {}. CORS allows any origin; \
             protect the port with a firewall or TLS-terminating proxy.",
            local_addr
        );
    }

    let gateway = state.gateway.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutting down Claude Code API Gateway...");
            gateway.shutdown().await;
        })
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
