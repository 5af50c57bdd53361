use super::state::AppState;
use crate::capture::CaptureStats;
use crate::error::ClientError;
use crate::session::{SessionRequest, SessionStats};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SubmitFrameRequest {
    /// Mono samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub session_id: Option<String>,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub session: SessionStats,
    pub capture: CaptureStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// HTTP status for a component error
pub fn status_for(err: &ClientError) -> StatusCode {
    match err {
        ClientError::NoActiveSession | ClientError::CaptureAlreadyRunning => StatusCode::CONFLICT,
        ClientError::InvalidRequest(_) | ClientError::InvalidFrame(_) => StatusCode::BAD_REQUEST,
        ClientError::CaptureUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ClientError::SessionCreation(_)
        | ClientError::SessionClose { .. }
        | ClientError::FrameSubmission(_)
        | ClientError::TelemetryFetch(_)
        | ClientError::StreamDecode(_) => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(err: ClientError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("{}", err);
    } else {
        warn!("{}", err);
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /session
/// Tracked session: active or most recently closed
pub async fn get_session(State(state): State<AppState>) -> Response {
    match state.controller.current_state().await {
        Some(session) => (StatusCode::OK, Json(session)).into_response(),
        None => not_found("No session"),
    }
}

/// POST /session
/// Create a session, or return the active one
pub async fn ensure_session(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Response {
    match state.controller.ensure_session(req).await {
        Ok(session) => {
            info!("Session {} ready", session.session_id());
            (StatusCode::OK, Json(session)).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /session/close
pub async fn close_session(State(state): State<AppState>) -> Response {
    match state.controller.close_session().await {
        Ok(Some(session)) => (StatusCode::OK, Json(session)).into_response(),
        Ok(None) => not_found("No active session"),
        Err(e) => error_response(e),
    }
}

/// POST /session/frames
/// Submit one block of samples by hand
pub async fn submit_frame(
    State(state): State<AppState>,
    Json(req): Json<SubmitFrameRequest>,
) -> Response {
    match state
        .controller
        .submit_audio_frame(&req.samples, req.sample_rate)
        .await
    {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /session/stats
pub async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.controller.stats().await;
    let capture = state.capture.stats().await;

    (StatusCode::OK, Json(StatsResponse { session, capture }))
}

/// GET /session/events
/// Event feed, newest first
pub async fn get_events(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.controller.events().await))
}

/// POST /capture/start
pub async fn start_capture(State(state): State<AppState>) -> Response {
    match state.capture.start_capture().await {
        Ok(session_id) => (
            StatusCode::OK,
            Json(CaptureResponse {
                session_id: Some(session_id),
                status: "capturing".to_string(),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /capture/stop
pub async fn stop_capture(State(state): State<AppState>) -> impl IntoResponse {
    let session_id = state.capture.bound_session().await;
    let stopped = state.capture.stop_capture().await;

    (
        StatusCode::OK,
        Json(CaptureResponse {
            session_id,
            status: if stopped { "stopped" } else { "idle" }.to_string(),
        }),
    )
}

/// GET /telemetry
/// Last polled snapshot and whether it is stale
pub async fn get_telemetry(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.telemetry.state().await))
}
