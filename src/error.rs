use thiserror::Error;

/// Errors surfaced by the session, stream, capture and telemetry components.
///
/// Plumbing (HTTP, config, backends) works in `anyhow::Result`; those errors are
/// flattened into one of these variants at the component boundary so callers can
/// match on what went wrong without caring how.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to create session: {0}")]
    SessionCreation(String),

    #[error("failed to close session {session_id}: {reason}")]
    SessionClose { session_id: String, reason: String },

    #[error("no active session")]
    NoActiveSession,

    #[error("audio capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("audio capture is already running")]
    CaptureAlreadyRunning,

    /// Inbound stream message failed validation. Logged, never fatal.
    #[error("failed to decode stream message: {0}")]
    StreamDecode(String),

    /// Telemetry poll failed. The poller keeps the last snapshot and marks it stale.
    #[error("failed to fetch telemetry: {0}")]
    TelemetryFetch(String),

    #[error("failed to submit audio frame: {0}")]
    FrameSubmission(String),

    #[error("invalid session request: {0}")]
    InvalidRequest(String),

    #[error("invalid audio frame: {0}")]
    InvalidFrame(String),
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Render an anyhow error with its full context chain on one line.
pub(crate) fn describe(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}
