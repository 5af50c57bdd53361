use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session lifecycle
        .route(
            "/session",
            get(handlers::get_session).post(handlers::ensure_session),
        )
        .route("/session/close", post(handlers::close_session))
        .route("/session/frames", post(handlers::submit_frame))
        .route("/session/stats", get(handlers::get_stats))
        .route("/session/events", get(handlers::get_events))
        // Capture control
        .route("/capture/start", post(handlers::start_capture))
        .route("/capture/stop", post(handlers::stop_capture))
        // Service telemetry
        .route("/telemetry", get(handlers::get_telemetry))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
