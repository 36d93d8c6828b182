// HTTP route handlers for the crucible server

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crucible_common::ai::{
    parse_generated, parse_replacement, parse_suggestions, GenerateRequest, Generated,
    ReviewRequest, Suggestion,
};
use crucible_common::types::{CompileRequest, ErrorKind, RunReport};

use crate::metrics;
use crate::AppState;

/// POST /api/compile - Run one submission through the pipeline
pub async fn compile(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CompileRequest>,
) -> impl IntoResponse {
    if payload.source_text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "source_text is required" })),
        )
            .into_response();
    }
    if payload.source_text.len() > state.config.max_source_bytes {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": format!(
                    "source exceeds maximum size of {} bytes",
                    state.config.max_source_bytes
                )
            })),
        )
            .into_response();
    }

    // The guard keeps the gauge honest when the client disconnects and
    // this future is dropped mid-submit.
    let in_flight = InFlight::begin();
    let report = state.engine.submit(&payload).await;
    drop(in_flight);
    metrics::record_outcome(&report);

    info!(
        job_id = %report.job_id,
        ok = report.ok,
        stage = %report.stage,
        error = ?report.error,
        truncated = report.truncated,
        "Job reported"
    );

    (status_for(&report), Json(report)).into_response()
}

/// One submission's presence in the in-flight gauge, released on drop.
struct InFlight;

impl InFlight {
    fn begin() -> Self {
        metrics::JOBS_SUBMITTED.inc();
        metrics::JOBS_IN_FLIGHT.inc();
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        metrics::JOBS_IN_FLIGHT.dec();
    }
}

/// Expected outcomes travel as 200s with `ok` and `error` telling the
/// story; operational faults get distinct status codes so clients can
/// separate "your code" from "our service".
fn status_for(report: &RunReport) -> StatusCode {
    match report.error {
        None | Some(ErrorKind::CompileFailed) | Some(ErrorKind::RunFailed) | Some(ErrorKind::TimedOut) => {
            StatusCode::OK
        }
        Some(ErrorKind::Busy) => StatusCode::TOO_MANY_REQUESTS,
        Some(ErrorKind::Resource) | Some(ErrorKind::ToolchainUnavailable) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        Some(ErrorKind::Aborted) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// GET /api/health - Liveness probe
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "OK",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "available_slots": state.engine.available_slots(),
        })),
    )
}

/// GET /metrics - Prometheus text exposition
pub async fn export_metrics() -> impl IntoResponse {
    match metrics::render() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => {
            error!(error = %err, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new()).into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub success: bool,
    pub suggestions: Vec<Suggestion>,
}

/// POST /api/review - AI code review (collaborator interface)
pub async fn review(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ReviewRequest>,
) -> impl IntoResponse {
    suggestions_via_collaborator(state, payload).await
}

/// POST /api/analyze-errors - AI analysis of a failed compile
pub async fn analyze_errors(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ReviewRequest>,
) -> impl IntoResponse {
    suggestions_via_collaborator(state, payload).await
}

async fn suggestions_via_collaborator(
    state: Arc<AppState>,
    payload: ReviewRequest,
) -> axum::response::Response {
    let Some(service) = state.suggestions.as_ref() else {
        return collaborator_unconfigured();
    };

    // The collaborator is unreliable by contract: transport errors and
    // unparsable answers both degrade to an empty list.
    let suggestions = match service.review(&payload).await {
        Ok(raw) => parse_suggestions(&raw),
        Err(err) => {
            error!(error = %err, "AI collaborator request failed");
            Vec::new()
        }
    };

    (
        StatusCode::OK,
        Json(SuggestionsResponse {
            success: true,
            suggestions,
        }),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct AutofixRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct AutofixResponse {
    pub success: bool,
    pub fixed_code: String,
}

/// POST /api/autofix - AI replacement code (collaborator interface)
pub async fn autofix(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AutofixRequest>,
) -> impl IntoResponse {
    let Some(service) = state.suggestions.as_ref() else {
        return collaborator_unconfigured();
    };

    let fixed_code = match service.autofix(&payload.code).await {
        Ok(raw) => parse_replacement(&raw, &payload.code),
        Err(err) => {
            error!(error = %err, "AI collaborator request failed");
            payload.code.clone()
        }
    };

    (
        StatusCode::OK,
        Json(AutofixResponse {
            success: true,
            fixed_code,
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub code: String,
    pub explanation: String,
}

/// POST /api/generate - AI code generation from a prompt (collaborator
/// interface)
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GenerateRequest>,
) -> impl IntoResponse {
    if payload.prompt.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "success": false, "error": "prompt is required" })),
        )
            .into_response();
    }
    let Some(service) = state.suggestions.as_ref() else {
        return collaborator_unconfigured();
    };

    let generated = match service.generate(&payload).await {
        Ok(raw) => parse_generated(&raw),
        Err(err) => {
            error!(error = %err, "AI collaborator request failed");
            Generated {
                code: String::new(),
                explanation: String::new(),
            }
        }
    };

    (
        StatusCode::OK,
        Json(GenerateResponse {
            success: true,
            code: generated.code,
            explanation: generated.explanation,
        }),
    )
        .into_response()
}

fn collaborator_unconfigured() -> axum::response::Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({
            "success": false,
            "error": "AI features are not configured on this server"
        })),
    )
        .into_response()
}
