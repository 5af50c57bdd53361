//! Local control API
//!
//! This module provides a REST API for driving the session client from a UI:
//! - GET/POST /session - Inspect or create the active session
//! - POST /session/close - Close the active session
//! - POST /session/frames - Submit a frame by hand
//! - GET /session/stats, GET /session/events - Statistics and event feed
//! - POST /capture/start, POST /capture/stop - Live capture control
//! - GET /telemetry - Latest service telemetry
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::status_for;
pub use routes::create_router;
pub use state::AppState;
