use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::{AudioBackend, AudioBlock, BackendFactory};
use crate::error::{describe, ClientError, Result};
use crate::session::{SessionController, SessionTeardown};
use crate::stream::SessionFence;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CaptureStats {
    pub capturing: bool,
    pub session_id: Option<String>,
    pub blocks_captured: u64,
    pub frames_submitted: u64,
    pub frames_failed: u64,
    /// Blocks dropped because the in-flight submission bound was reached
    pub blocks_dropped: u64,
}

#[derive(Default)]
struct Counters {
    blocks_captured: AtomicU64,
    frames_submitted: AtomicU64,
    frames_failed: AtomicU64,
    blocks_dropped: AtomicU64,
}

struct RunningCapture {
    session_id: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Streams captured audio into the active session, one frame per block.
///
/// At most one capture runs at a time. The backend is owned by a supervisor
/// task that stops processing, disconnects the source and releases the device
/// on every exit path: explicit stop, session close, or the source running dry.
pub struct CapturePipeline {
    controller: Arc<SessionController>,
    factory: Arc<dyn BackendFactory>,
    in_flight: Arc<Semaphore>,
    running: Mutex<Option<RunningCapture>>,
    counters: Arc<Counters>,
}

impl CapturePipeline {
    pub fn new(
        controller: Arc<SessionController>,
        factory: Arc<dyn BackendFactory>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            controller,
            factory,
            in_flight: Arc::new(Semaphore::new(max_in_flight.max(1))),
            running: Mutex::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Acquire the audio source and start streaming it into the active session.
    ///
    /// Returns the session id the capture is bound to.
    pub async fn start_capture(&self) -> Result<String> {
        // Held for the whole start so two callers can never both open the device
        let mut running = self.running.lock().await;

        if let Some(current) = running.as_ref() {
            if !current.task.is_finished() {
                return Err(ClientError::CaptureAlreadyRunning);
            }
        }
        if let Some(finished) = running.take() {
            let _ = finished.task.await;
        }

        let session_id = self
            .controller
            .active_session_id()
            .ok_or(ClientError::NoActiveSession)?;

        let mut backend = self
            .factory
            .create()
            .map_err(|e| ClientError::CaptureUnavailable(describe(&e)))?;

        info!("Starting {} capture for session {}", backend.name(), session_id);

        let blocks = match backend.start().await {
            Ok(rx) => rx,
            Err(e) => {
                if let Err(stop_err) = backend.stop().await {
                    warn!("Failed to release {} backend: {:#}", backend.name(), stop_err);
                }
                return Err(ClientError::CaptureUnavailable(describe(&e)));
            }
        };

        let cancel = CancellationToken::new();
        let fence = SessionFence::new(&session_id, self.controller.context().clone(), cancel.clone());

        let task = tokio::spawn(supervise(
            backend,
            blocks,
            fence,
            self.controller.clone(),
            self.in_flight.clone(),
            self.counters.clone(),
        ));

        *running = Some(RunningCapture {
            session_id: session_id.clone(),
            cancel,
            task,
        });

        Ok(session_id)
    }

    /// Stop the running capture. Returns false when nothing was running.
    pub async fn stop_capture(&self) -> bool {
        let mut running = self.running.lock().await;
        self.stop_locked(&mut running).await
    }

    async fn stop_locked(&self, running: &mut Option<RunningCapture>) -> bool {
        let Some(capture) = running.take() else {
            return false;
        };

        let was_live = !capture.task.is_finished();
        capture.cancel.cancel();

        if let Err(e) = capture.task.await {
            warn!("Capture task for session {} failed: {}", capture.session_id, e);
        }

        was_live
    }

    pub async fn is_capturing(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|c| !c.task.is_finished())
            .unwrap_or(false)
    }

    /// Session the live capture is bound to, if any
    pub async fn bound_session(&self) -> Option<String> {
        self.running
            .lock()
            .await
            .as_ref()
            .filter(|c| !c.task.is_finished())
            .map(|c| c.session_id.clone())
    }

    pub async fn stats(&self) -> CaptureStats {
        let session_id = self.bound_session().await;

        CaptureStats {
            capturing: session_id.is_some(),
            session_id,
            blocks_captured: self.counters.blocks_captured.load(Ordering::SeqCst),
            frames_submitted: self.counters.frames_submitted.load(Ordering::SeqCst),
            frames_failed: self.counters.frames_failed.load(Ordering::SeqCst),
            blocks_dropped: self.counters.blocks_dropped.load(Ordering::SeqCst),
        }
    }
}

#[async_trait::async_trait]
impl SessionTeardown for CapturePipeline {
    async fn session_closed(&self, session_id: &str) {
        let mut running = self.running.lock().await;

        let bound = running.as_ref().map(|c| c.session_id == session_id).unwrap_or(false);
        if bound && self.stop_locked(&mut running).await {
            info!("Capture stopped with session {}", session_id);
        }
    }
}

/// Owns the backend for one capture run
async fn supervise(
    mut backend: Box<dyn AudioBackend>,
    mut blocks: mpsc::Receiver<AudioBlock>,
    fence: SessionFence,
    controller: Arc<SessionController>,
    in_flight: Arc<Semaphore>,
    counters: Arc<Counters>,
) {
    let session_id = fence.session_id().to_string();
    let cancel = fence.cancel_token().clone();
    let mut context = controller.context().subscribe();

    loop {
        if !fence.holds() {
            info!("Session {} no longer active, stopping capture", session_id);
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Capture for session {} cancelled", session_id);
                break;
            }

            changed = context.changed() => {
                if changed.is_err() {
                    break;
                }
            }

            block = blocks.recv() => match block {
                Some(block) => dispatch(block, &session_id, &controller, &in_flight, &counters),
                None => {
                    info!("Audio source for session {} ended", session_id);
                    break;
                }
            },
        }
    }

    // Processing first, then the source, then the device
    blocks.close();
    drop(blocks);

    if let Err(e) = backend.stop().await {
        warn!("Failed to stop {} backend: {:#}", backend.name(), e);
    }

    info!("Capture for session {} released", session_id);
}

/// Fire-and-forget submission of one block
fn dispatch(
    block: AudioBlock,
    session_id: &str,
    controller: &Arc<SessionController>,
    in_flight: &Arc<Semaphore>,
    counters: &Arc<Counters>,
) {
    counters.blocks_captured.fetch_add(1, Ordering::SeqCst);

    let Ok(permit) = in_flight.clone().try_acquire_owned() else {
        counters.blocks_dropped.fetch_add(1, Ordering::SeqCst);
        warn!("Too many frames in flight, dropping block for session {}", session_id);
        return;
    };

    let session_id = session_id.to_string();
    let controller = controller.clone();
    let counters = counters.clone();

    tokio::spawn(async move {
        let _permit = permit;

        match controller
            .submit_for(&session_id, &block.samples, block.sample_rate, block.captured_at_ms)
            .await
        {
            Ok(ack) => {
                counters.frames_submitted.fetch_add(1, Ordering::SeqCst);
                debug!("Frame {} acknowledged ({:.2} ms)", ack.frame_id, ack.duration_ms);
            }
            Err(e) => {
                counters.frames_failed.fetch_add(1, Ordering::SeqCst);
                warn!("Frame submission failed for session {}: {}", session_id, e);
            }
        }
    });
}
