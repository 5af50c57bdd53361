use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::context::SessionContext;
use super::request::SessionRequest;
use super::stats::SessionStats;
use crate::error::{describe, ClientError, Result};
use crate::remote::{AudioFrame, SessionEvent, SessionService, SessionState};
use crate::stream::{EventStreamClient, StreamStatus};

/// Something bound to a session that must be released when the session closes
#[async_trait::async_trait]
pub trait SessionTeardown: Send + Sync {
    /// Called after the session context has been cleared, before `close_session`
    /// returns. Must release everything bound to `session_id`.
    async fn session_closed(&self, session_id: &str);
}

/// Owns the single active session and its event stream.
///
/// `Uninitialized → Active → Closed`; a closed session is never reactivated,
/// `ensure_session` after a close creates a new one. The controller is the only
/// writer of the shared `SessionContext`.
pub struct SessionController {
    service: Arc<dyn SessionService>,
    context: SessionContext,
    stream: EventStreamClient,
    state: Mutex<Option<SessionState>>,
    teardown: std::sync::Mutex<Vec<Weak<dyn SessionTeardown>>>,
    frames_submitted: AtomicU64,
    frames_failed: AtomicU64,
}

impl SessionController {
    pub fn new(
        service: Arc<dyn SessionService>,
        context: SessionContext,
        stream: EventStreamClient,
    ) -> Self {
        Self {
            service,
            context,
            stream,
            state: Mutex::new(None),
            teardown: std::sync::Mutex::new(Vec::new()),
            frames_submitted: AtomicU64::new(0),
            frames_failed: AtomicU64::new(0),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn stream(&self) -> &EventStreamClient {
        &self.stream
    }

    /// Register a component to be torn down whenever the session closes
    pub fn register_teardown(&self, hook: Weak<dyn SessionTeardown>) {
        let mut hooks = self.teardown.lock().unwrap_or_else(|e| e.into_inner());
        hooks.push(hook);
    }

    /// Return the active session, creating it first if there is none.
    ///
    /// Idempotent while a session is active: the existing state is returned and the
    /// event stream re-opened if its task has stopped.
    pub async fn ensure_session(&self, request: SessionRequest) -> Result<SessionState> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.as_ref().filter(|s| s.active) {
            let session_id = existing.session_id();
            if !self.stream.is_running(session_id).await {
                info!("Re-opening event stream for session {}", session_id);
                if let Err(e) = self.stream.open(session_id).await {
                    warn!("Failed to re-open event stream for {}: {:#}", session_id, e);
                }
            }
            return Ok(existing.clone());
        }

        request.validate()?;

        info!(
            "Creating session for user {} (intent: {:?})",
            request.user_id, request.intent
        );

        let created = self
            .service
            .create_session(&request)
            .await
            .map_err(|e| ClientError::SessionCreation(describe(&e)))?;

        if created.session_id().is_empty() {
            return Err(ClientError::SessionCreation(
                "service returned an empty session_id".into(),
            ));
        }
        if !created.active {
            return Err(ClientError::SessionCreation(format!(
                "service returned session {} already inactive",
                created.session_id()
            )));
        }

        let session_id = created.session_id().to_string();
        self.context.activate(&session_id);
        *state = Some(created.clone());

        info!("Session {} created", session_id);

        if let Err(e) = self.stream.open(&session_id).await {
            warn!("Failed to open event stream for {}: {:#}", session_id, e);
        }

        Ok(created)
    }

    /// Close the active session.
    ///
    /// Returns `Ok(None)` when there is nothing to close. The stream and every
    /// registered teardown hook are released even when the remote call fails.
    pub async fn close_session(&self) -> Result<Option<SessionState>> {
        let mut state = self.state.lock().await;

        let current = match state.as_ref() {
            Some(s) if s.active => s.clone(),
            _ => return Ok(None),
        };
        let session_id = current.session_id().to_string();

        info!("Closing session {}", session_id);

        let remote = self.service.close_session(&session_id).await;

        self.teardown_local(&session_id).await;

        match remote {
            Ok(closed) => {
                let closed = closed.into_inactive();
                *state = Some(closed.clone());
                info!("Session {} closed", session_id);
                Ok(Some(closed))
            }
            Err(e) => {
                *state = Some(current.into_inactive());
                warn!("Remote close failed for session {}: {:#}", session_id, e);
                Err(ClientError::SessionClose {
                    session_id,
                    reason: describe(&e),
                })
            }
        }
    }

    /// Controller teardown: local release plus a best-effort remote close
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;

        match state.as_ref().filter(|s| s.active).cloned() {
            Some(current) => {
                let session_id = current.session_id().to_string();
                if let Err(e) = self.service.close_session(&session_id).await {
                    warn!("Remote close failed during shutdown for {}: {:#}", session_id, e);
                }
                self.teardown_local(&session_id).await;
                *state = Some(current.into_inactive());
            }
            None => self.stream.close().await,
        }

        info!("Session controller shut down");
    }

    async fn teardown_local(&self, session_id: &str) {
        // Fence first: reconnects and capture auto-stop key off the context
        self.context.clear();
        self.stream.close().await;

        let hooks: Vec<Arc<dyn SessionTeardown>> = {
            let mut hooks = self.teardown.lock().unwrap_or_else(|e| e.into_inner());
            hooks.retain(|hook| hook.strong_count() > 0);
            hooks.iter().filter_map(Weak::upgrade).collect()
        };

        for hook in hooks {
            hook.session_closed(session_id).await;
        }
    }

    /// Submit one block of mono samples to the active session
    pub async fn submit_audio_frame(&self, samples: &[f32], sample_rate: u32) -> Result<AudioFrame> {
        let session_id = self.context.current().ok_or(ClientError::NoActiveSession)?;
        self.submit_for(&session_id, samples, sample_rate, now_ms()).await
    }

    /// Submit a frame on behalf of `session_id`, failing if it is no longer active.
    ///
    /// A frame racing `close_session` may still reach the service or may fail;
    /// neither outcome is an error for the session.
    pub(crate) async fn submit_for(
        &self,
        session_id: &str,
        samples: &[f32],
        sample_rate: u32,
        timestamp_ms: f64,
    ) -> Result<AudioFrame> {
        if !self.context.is_current(session_id) {
            return Err(ClientError::NoActiveSession);
        }

        let frame = AudioFrame::from_samples(session_id, samples, sample_rate, timestamp_ms)?;

        match self.service.submit_frame(&frame).await {
            Ok(ack) => {
                self.frames_submitted.fetch_add(1, Ordering::SeqCst);
                Ok(ack)
            }
            Err(e) => {
                self.frames_failed.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::FrameSubmission(describe(&e)))
            }
        }
    }

    /// The tracked session: active, most recently closed, or none
    pub async fn current_state(&self) -> Option<SessionState> {
        self.state.lock().await.clone()
    }

    pub fn active_session_id(&self) -> Option<String> {
        self.context.current()
    }

    /// Stream events for the active session, newest first
    pub async fn events(&self) -> Vec<SessionEvent> {
        self.stream.events().await
    }

    pub fn stream_status(&self) -> StreamStatus {
        self.stream.status()
    }

    pub async fn stats(&self) -> SessionStats {
        let state = self.state.lock().await.clone();

        SessionStats {
            session_id: state.as_ref().map(|s| s.session_id().to_string()),
            active: state.as_ref().map(|s| s.active).unwrap_or(false),
            created_at: state.as_ref().map(|s| s.metadata.created_at),
            stream: self.stream.status(),
            frames_submitted: self.frames_submitted.load(Ordering::SeqCst),
            frames_failed: self.frames_failed.load(Ordering::SeqCst),
            events_received: self.stream.events_received().await,
            messages_rejected: self.stream.messages_rejected(),
        }
    }
}

/// Wall clock in milliseconds since the Unix epoch
pub(crate) fn now_ms() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}
