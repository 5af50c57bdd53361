use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::stream::StreamStatus;

/// Statistics about the tracked session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Id of the tracked session (active or most recently closed)
    pub session_id: Option<String>,

    /// Whether the session is currently active
    pub active: bool,

    /// When the service created the session
    pub created_at: Option<DateTime<Utc>>,

    /// State of the event stream
    pub stream: StreamStatus,

    /// Frames acknowledged by the service since the controller started
    pub frames_submitted: u64,

    /// Frame submissions that failed
    pub frames_failed: u64,

    /// Events accepted into the feed (including evicted ones)
    pub events_received: u64,

    /// Stream messages dropped by validation
    pub messages_rejected: u64,
}
