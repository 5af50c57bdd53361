use anyhow::Result;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::feed::EventFeed;
use super::state::{SessionFence, StreamStatus};
use crate::config::StreamConfig;
use crate::error::ClientError;
use crate::remote::{stream_url, SessionEvent};
use crate::session::SessionContext;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Application-level liveness ping; replies are not interpreted
const HEARTBEAT_MESSAGE: &str = "ping";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Floor for intervals fed to `tokio::time::interval`, which panics on zero
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Timing and retention for the event stream
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Fixed wait between a disconnect and the next attempt
    pub reconnect_delay: Duration,
    pub heartbeat_interval: Duration,
    pub feed_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(1500),
            heartbeat_interval: Duration::from_secs(30),
            feed_capacity: 100,
        }
    }
}

impl StreamSettings {
    fn clamped(self) -> Self {
        Self {
            reconnect_delay: self.reconnect_delay.max(MIN_INTERVAL),
            heartbeat_interval: self.heartbeat_interval.max(MIN_INTERVAL),
            feed_capacity: self.feed_capacity.max(1),
        }
    }
}

impl From<&StreamConfig> for StreamSettings {
    fn from(config: &StreamConfig) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay(),
            heartbeat_interval: config.heartbeat_interval(),
            feed_capacity: config.feed_capacity,
        }
        .clamped()
    }
}

struct ActiveStream {
    session_id: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Receives `SessionEvent`s pushed for one session at a time.
///
/// Owns the socket and a background task that reconnects after drops for as long
/// as its session stays the active one in the `SessionContext`.
pub struct EventStreamClient {
    base_url: Url,
    settings: StreamSettings,
    context: SessionContext,
    feed: Arc<Mutex<EventFeed>>,
    status: Arc<watch::Sender<StreamStatus>>,
    rejected: Arc<AtomicU64>,
    active: Mutex<Option<ActiveStream>>,
}

impl EventStreamClient {
    pub fn new(base_url: Url, settings: StreamSettings, context: SessionContext) -> Self {
        let settings = settings.clamped();
        let (status, _) = watch::channel(StreamStatus::Idle);
        Self {
            base_url,
            feed: Arc::new(Mutex::new(EventFeed::new(settings.feed_capacity))),
            settings,
            context,
            status: Arc::new(status),
            rejected: Arc::new(AtomicU64::new(0)),
            active: Mutex::new(None),
        }
    }

    /// Start streaming events for `session_id`.
    ///
    /// No-op if a stream task for the same session is still running (connected or
    /// waiting to reconnect). Any stream for another session is closed first.
    pub async fn open(&self, session_id: &str) -> Result<()> {
        let mut active = self.active.lock().await;

        if let Some(stream) = active.as_ref() {
            if stream.session_id == session_id && !stream.task.is_finished() {
                debug!("Event stream for session {} already running", session_id);
                return Ok(());
            }
        }

        if let Some(previous) = active.take() {
            let switching = previous.session_id != session_id;
            Self::stop(previous).await;
            if switching {
                self.feed.lock().await.clear();
            }
        }

        let url = stream_url(&self.base_url, session_id)?;
        let cancel = CancellationToken::new();
        let fence = SessionFence::new(session_id, self.context.clone(), cancel.clone());

        info!("Opening event stream: {}", url);

        let task = tokio::spawn(run_stream(
            url,
            fence,
            self.settings.clone(),
            Arc::clone(&self.feed),
            Arc::clone(&self.status),
            Arc::clone(&self.rejected),
        ));

        *active = Some(ActiveStream {
            session_id: session_id.to_string(),
            cancel,
            task,
        });

        Ok(())
    }

    /// Stop the stream, cancel any pending reconnect and clear the feed
    pub async fn close(&self) {
        let previous = self.active.lock().await.take();

        if let Some(stream) = previous {
            info!("Closing event stream for session {}", stream.session_id);
            Self::stop(stream).await;
        }

        self.feed.lock().await.clear();
        self.status.send_replace(StreamStatus::Closed);
    }

    async fn stop(stream: ActiveStream) {
        stream.cancel.cancel();
        if let Err(e) = stream.task.await {
            warn!("Event stream task for {} ended abnormally: {}", stream.session_id, e);
        }
    }

    /// Whether a stream task for `session_id` is alive
    pub async fn is_running(&self, session_id: &str) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|s| s.session_id == session_id && !s.task.is_finished())
            .unwrap_or(false)
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().is_connected()
    }

    pub fn status(&self) -> StreamStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StreamStatus> {
        self.status.subscribe()
    }

    /// Retained events, newest first
    pub async fn events(&self) -> Vec<SessionEvent> {
        self.feed.lock().await.snapshot()
    }

    pub async fn events_received(&self) -> u64 {
        self.feed.lock().await.total_received()
    }

    /// Messages dropped because they failed validation
    pub fn messages_rejected(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }
}

impl Drop for EventStreamClient {
    fn drop(&mut self) {
        // Without an async context the task cannot be awaited; cancelling is enough
        // for it to send a close frame and exit.
        if let Some(stream) = self.active.get_mut().take() {
            stream.cancel.cancel();
        }
    }
}

enum Disconnect {
    Cancelled,
    Dropped(String),
}

/// Connect → pump → (fenced) fixed-delay wait → connect, until cancelled or fenced off
async fn run_stream(
    url: Url,
    fence: SessionFence,
    settings: StreamSettings,
    feed: Arc<Mutex<EventFeed>>,
    status: Arc<watch::Sender<StreamStatus>>,
    rejected: Arc<AtomicU64>,
) {
    let session_id = fence.session_id().to_string();
    let mut attempt: u32 = 0;

    loop {
        if !fence.holds() {
            break;
        }

        status.send_replace(StreamStatus::Connecting);

        let connected = tokio::select! {
            _ = fence.cancel_token().cancelled() => break,
            result = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str())) => result,
        };

        match connected {
            Ok(Ok((socket, _response))) => {
                attempt = 0;
                status.send_replace(StreamStatus::Connected);
                info!("Event stream connected for session {}", session_id);

                match pump(socket, &fence, &settings, &feed, &rejected).await {
                    Disconnect::Cancelled => break,
                    Disconnect::Dropped(reason) => {
                        warn!("Event stream for session {} dropped: {}", session_id, reason);
                    }
                }
            }
            Ok(Err(e)) => {
                warn!("Event stream connection failed for session {}: {}", session_id, e);
            }
            Err(_) => {
                warn!(
                    "Event stream connection timed out for session {} after {:?}",
                    session_id, CONNECT_TIMEOUT
                );
            }
        }

        if !fence.holds() {
            info!("Session {} is no longer active; not reconnecting", session_id);
            break;
        }

        attempt += 1;
        status.send_replace(StreamStatus::Reconnecting { attempt });
        debug!(
            "Reconnecting event stream for session {} in {:?} (attempt {})",
            session_id, settings.reconnect_delay, attempt
        );

        tokio::select! {
            _ = fence.cancel_token().cancelled() => break,
            _ = tokio::time::sleep(settings.reconnect_delay) => {}
        }
    }

    status.send_replace(StreamStatus::Closed);
    debug!("Event stream task for session {} finished", session_id);
}

async fn pump(
    socket: Socket,
    fence: &SessionFence,
    settings: &StreamSettings,
    feed: &Mutex<EventFeed>,
    rejected: &AtomicU64,
) -> Disconnect {
    let (mut sink, mut source) = socket.split();

    let mut heartbeat = tokio::time::interval(settings.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = fence.cancel_token().cancelled() => {
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.send(Message::Close(None))).await;
                return Disconnect::Cancelled;
            }
            _ = heartbeat.tick() => {
                let ping = sink.send(Message::Text(HEARTBEAT_MESSAGE.to_string().into()));
                tokio::select! {
                    _ = fence.cancel_token().cancelled() => return Disconnect::Cancelled,
                    sent = tokio::time::timeout(settings.heartbeat_interval.max(CLOSE_TIMEOUT), ping) => match sent {
                        Ok(Ok(())) => debug!("Sent heartbeat for session {}", fence.session_id()),
                        Ok(Err(e)) => return Disconnect::Dropped(format!("heartbeat failed: {}", e)),
                        Err(_) => return Disconnect::Dropped("heartbeat send timed out".to_string()),
                    },
                }
            }
            message = source.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        accept(text.as_str(), fence, feed, rejected).await;
                    }
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => accept(text, fence, feed, rejected).await,
                        Err(e) => reject(fence, rejected, ClientError::StreamDecode(e.to_string())),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let reason = match frame {
                            Some(frame) => format!(
                                "closed by server ({} {})",
                                u16::from(frame.code),
                                frame.reason.as_str()
                            ),
                            None => "closed by server".to_string(),
                        };
                        return Disconnect::Dropped(reason);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Disconnect::Dropped(e.to_string()),
                    None => return Disconnect::Dropped("connection ended".to_string()),
                }
            }
        }
    }
}

async fn accept(raw: &str, fence: &SessionFence, feed: &Mutex<EventFeed>, rejected: &AtomicU64) {
    if raw == "pong" || raw == HEARTBEAT_MESSAGE {
        return;
    }

    match SessionEvent::decode(raw) {
        Ok(event) if event.session_id != fence.session_id() => reject(
            fence,
            rejected,
            ClientError::StreamDecode(format!("event for foreign session {}", event.session_id)),
        ),
        Ok(event) => {
            if !fence.holds() {
                return;
            }
            debug!("Stream event {}", event.label());
            feed.lock().await.push(event);
        }
        Err(e) => reject(fence, rejected, e),
    }
}

fn reject(fence: &SessionFence, rejected: &AtomicU64, err: ClientError) {
    rejected.fetch_add(1, Ordering::SeqCst);
    warn!("Dropping stream message for session {}: {}", fence.session_id(), err);
}
