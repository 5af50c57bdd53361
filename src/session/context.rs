use std::sync::Arc;
use tokio::sync::watch;

/// The currently active session id, shared by every component of one client.
///
/// Single writer: only the `SessionController` publishes or clears the id (the
/// writer methods are crate-private and called from its create/close/shutdown
/// paths). The event stream and the capture pipeline only read it, to decide
/// whether a reconnect or a running capture still belongs to the live session.
#[derive(Clone)]
pub struct SessionContext {
    active: Arc<watch::Sender<Option<String>>>,
}

impl SessionContext {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { active: Arc::new(tx) }
    }

    /// Id of the active session, if any
    pub fn current(&self) -> Option<String> {
        self.active.borrow().clone()
    }

    /// Whether `session_id` is still the active session
    pub fn is_current(&self, session_id: &str) -> bool {
        self.active.borrow().as_deref() == Some(session_id)
    }

    /// Observe changes to the active session id
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.active.subscribe()
    }

    pub(crate) fn activate(&self, session_id: &str) {
        self.active.send_replace(Some(session_id.to_string()));
    }

    pub(crate) fn clear(&self) {
        self.active.send_replace(None);
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}
