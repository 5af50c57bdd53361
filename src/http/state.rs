use crate::app::App;
use crate::capture::CapturePipeline;
use crate::session::SessionController;
use crate::telemetry::TelemetryPoller;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SessionController>,
    pub capture: Arc<CapturePipeline>,
    pub telemetry: Arc<TelemetryPoller>,
}

impl AppState {
    pub fn new(app: &App) -> Self {
        Self {
            controller: app.controller().clone(),
            capture: app.capture().clone(),
            telemetry: app.telemetry().clone(),
        }
    }
}
