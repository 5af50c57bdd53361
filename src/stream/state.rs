use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::session::SessionContext;

/// Observable state of a session's event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StreamStatus {
    /// Never opened
    Idle,
    Connecting,
    Connected,
    /// Waiting out the fixed delay before reconnect attempt `attempt`
    Reconnecting { attempt: u32 },
    /// Terminal for this stream: closed, cancelled or fenced off
    Closed,
}

impl StreamStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Guard for background work scheduled on behalf of one session.
///
/// Holds while the stream has not been cancelled and `session_id` is still the
/// context's active session. A reconnect scheduled for session A never fires
/// once session B has started, even if A's token was never cancelled.
#[derive(Clone)]
pub(crate) struct SessionFence {
    session_id: String,
    context: SessionContext,
    cancel: CancellationToken,
}

impl SessionFence {
    pub(crate) fn new(session_id: &str, context: SessionContext, cancel: CancellationToken) -> Self {
        Self {
            session_id: session_id.to_string(),
            context,
            cancel,
        }
    }

    pub(crate) fn holds(&self) -> bool {
        !self.cancel.is_cancelled() && self.context.is_current(&self.session_id)
    }

    pub(crate) fn session_id(&self) -> &str {
        &self.session_id
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
