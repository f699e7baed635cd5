// Request handlers for the security service.
//
// Input validation happens here, before anything reaches the agent:
// empty required fields are rejected with 400. Analyzer/LLM trouble never
// surfaces as a call error (the agent absorbs it into report content),
// so the only agent error these handlers map is NotInitialized (503).

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::{api_error, AppState};
use crate::agent::NotInitialized;
use crate::report::{ThreatLevel, ThreatReport};

// ============================================================
// Request/response shapes
// ============================================================

#[derive(Debug, Deserialize)]
pub struct AnalyzeUrlRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_true")]
    pub use_llm: bool,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeScriptRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub source_url: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzePageRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub html_content: String,
    #[serde(default = "default_true")]
    pub use_llm: bool,
}

#[derive(Debug, Serialize)]
pub struct PageAnalysisResponse {
    #[serde(flatten)]
    pub report: ThreatReport,
    /// 0-100, where 100 is fully safe.
    pub security_score: u32,
    pub content_size: usize,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub min_level: u8,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Default LOW: stream every non-safe report.
    #[serde(default = "default_stream_level")]
    pub min_level: u8,
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    50
}

fn default_stream_level() -> u8 {
    1
}

// ============================================================
// Analysis endpoints
// ============================================================

/// POST /api/analyze/url
pub async fn analyze_url(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeUrlRequest>,
) -> Response {
    if request.url.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "url must not be empty");
    }
    info!(url = %request.url, use_llm = request.use_llm, "AnalyzeUrl request");

    match state.agent.analyze_url(&request.url, request.use_llm).await {
        Ok(report) => {
            state.hub.publish(report.clone()).await;
            Json(report).into_response()
        }
        Err(e) => agent_error(e),
    }
}

/// POST /api/analyze/script
pub async fn analyze_script(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeScriptRequest>,
) -> Response {
    if request.code.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "code must not be empty");
    }
    info!(
        bytes = request.code.len(),
        source_url = %request.source_url,
        "AnalyzeScript request"
    );

    match state
        .agent
        .analyze_script(&request.code, &request.source_url)
        .await
    {
        Ok(report) => {
            state.hub.publish(report.clone()).await;
            Json(report).into_response()
        }
        Err(e) => agent_error(e),
    }
}

/// POST /api/analyze/page
pub async fn analyze_page(
    State(state): State<AppState>,
    Json(request): Json<AnalyzePageRequest>,
) -> Response {
    if request.url.is_empty() || request.html_content.is_empty() {
        return api_error(
            StatusCode::BAD_REQUEST,
            "url and html_content must not be empty",
        );
    }
    info!(
        url = %request.url,
        bytes = request.html_content.len(),
        "AnalyzePage request"
    );

    match state
        .agent
        .analyze_page(&request.url, &request.html_content, request.use_llm)
        .await
    {
        Ok(report) => {
            state.hub.publish(report.clone()).await;
            let response = PageAnalysisResponse {
                security_score: report.security_score(),
                content_size: request.html_content.len(),
                report,
            };
            Json(response).into_response()
        }
        Err(e) => agent_error(e),
    }
}

// ============================================================
// Aggregate query
// ============================================================

/// GET /api/report
pub async fn get_security_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Response {
    let Ok(min_level) = ThreatLevel::try_from(query.min_level) else {
        return api_error(StatusCode::BAD_REQUEST, "min_level must be 0-4");
    };

    let summary = state.hub.snapshot(query.limit, min_level).await;
    let cache_size = state.agent.cache_size().await;

    Json(serde_json::json!({
        "reports": summary.reports,
        "total_analyzed": summary.total_analyzed,
        "safe_count": summary.safe_count,
        "threat_count": summary.threat_count,
        "cache_size": cache_size,
    }))
    .into_response()
}

// ============================================================
// Live threat stream (SSE)
// ============================================================

/// GET /api/threats/stream
pub async fn stream_threats(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let Ok(min_level) = ThreatLevel::try_from(query.min_level) else {
        return api_error(StatusCode::BAD_REQUEST, "min_level must be 0-4");
    };

    info!(min_level = %min_level, "StreamThreats subscriber connected");
    let subscription = state.hub.subscribe(min_level);

    let stream: std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> =
        Box::pin(futures::stream::unfold(subscription, |mut sub| async move {
            let report = sub.recv().await?;
            let event = Event::default().json_data(report.as_ref()).ok()?;
            Some((Ok(event), sub))
        }));

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

// ============================================================
// Health
// ============================================================

/// GET /health — must never error.
pub async fn health_check(State(state): State<AppState>) -> Response {
    Json(serde_json::json!({
        "status": "SERVING",
        "agent_initialized": state.agent.is_initialized().await,
        "cache_size": state.agent.cache_size().await,
        "total_reports": state.hub.stored_count().await,
        "active_streams": state.hub.subscriber_count(),
        "timestamp": chrono::Utc::now(),
        "version": state.config.version,
    }))
    .into_response()
}

fn agent_error(e: anyhow::Error) -> Response {
    if e.downcast_ref::<NotInitialized>().is_some() {
        return api_error(StatusCode::SERVICE_UNAVAILABLE, &e.to_string());
    }
    error!(error = %e, "analysis failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "analysis failed")
}
