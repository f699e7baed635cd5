// HTTP service boundary — Axum server exposing the security agent.
//
// Request/response endpoints cover URL, script, and page analysis plus the
// aggregate report query; the threat stream is served as SSE and stays
// open until the client disconnects. Shutdown is graceful: stop accepting
// requests, drain in-flight ones, then release the agent (which clears
// its cache).

use std::sync::Arc;

use anyhow::Result;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::agent::SecurityAgent;
use crate::config::Config;
use crate::hub::ReportHub;

pub mod handlers;

/// Shared application state threaded through all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<SecurityAgent>,
    pub hub: Arc<ReportHub>,
    pub config: Arc<Config>,
}

/// Start the HTTP server and block until shutdown completes.
pub async fn run_server(config: Config) -> Result<()> {
    let agent = Arc::new(SecurityAgent::new(config.clone()));
    agent.initialize().await?;

    let hub = Arc::new(ReportHub::new(config.max_reports, config.stream_capacity));
    let state = AppState {
        agent: agent.clone(),
        hub,
        config: Arc::new(config.clone()),
    };

    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Palisade security agent listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight requests have drained; release the agent last.
    agent.shutdown().await;
    info!("Server stopped");
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze/url", post(handlers::analyze_url))
        .route("/api/analyze/script", post(handlers::analyze_script))
        .route("/api/analyze/page", post(handlers::analyze_page))
        .route("/api/report", get(handlers::get_security_report))
        .route("/api/threats/stream", get(handlers::stream_threats))
        .route("/health", get(handlers::health_check))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining in-flight requests");
}

/// Typed JSON error response helper.
pub fn api_error(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
}
