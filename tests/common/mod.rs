// Shared fixtures for integration tests
//
// - FakeService: in-memory SessionService that records every call
// - ScriptedFactory: audio backend that emits a fixed number of blocks
// - StreamServer: in-process websocket server standing in for the session stream

#![allow(dead_code)]

use anyhow::{bail, Result};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use notelink::audio::{AudioBackend, AudioBlock, BackendFactory};
use notelink::config::Config;
use notelink::{
    AudioFrame, SessionMetadata, SessionRequest, SessionService, SessionState, TelemetrySnapshot,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub const BLOCK_SIZE: usize = 4096;
pub const SAMPLE_RATE: u32 = 22050;

/// Poll `check` until it holds or `timeout` elapses
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Defaults with fast timings, pointed at `base_url`
pub fn test_config(base_url: &str) -> Config {
    let mut config = Config::defaults().expect("defaults load");
    config.service.base_url = base_url.to_string();
    config.stream.reconnect_delay_ms = 50;
    config.stream.heartbeat_interval_ms = 30_000;
    config
}

pub fn event_json(session_id: &str, source: &str, payload: serde_json::Value) -> String {
    serde_json::json!({
        "session_id": session_id,
        "source": source,
        "target": "broadcast",
        "payload": payload,
        "created_at": "2025-03-01T10:15:30.250000",
    })
    .to_string()
}

// ============================================================================
// Fake remote service
// ============================================================================

#[derive(Default)]
pub struct FakeService {
    next_id: AtomicUsize,
    pub created: Mutex<Vec<SessionRequest>>,
    pub closed: Mutex<Vec<String>>,
    pub frames: Mutex<Vec<AudioFrame>>,
    pub telemetry_calls: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_close: AtomicBool,
    pub fail_frames: AtomicBool,
    pub fail_telemetry: AtomicBool,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn frames(&self) -> Vec<AudioFrame> {
        self.frames.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SessionService for FakeService {
    async fn create_session(&self, request: &SessionRequest) -> Result<SessionState> {
        if self.fail_create.load(Ordering::SeqCst) {
            bail!("service rejected the request (422)");
        }

        self.created.lock().unwrap().push(request.clone());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;

        Ok(SessionState {
            metadata: SessionMetadata {
                session_id: format!("sess_{:04}", n),
                user_id: request.user_id.clone(),
                intent: request.intent,
                daw: request.daw.clone(),
                key: request.key.clone(),
                tempo: request.tempo,
                emotional_goal: request.emotional_goal.clone(),
                references: request.references.clone(),
                created_at: Utc::now(),
            },
            active: true,
            attributes: serde_json::Map::new(),
        })
    }

    async fn close_session(&self, session_id: &str) -> Result<SessionState> {
        self.closed.lock().unwrap().push(session_id.to_string());

        if self.fail_close.load(Ordering::SeqCst) {
            bail!("connection reset");
        }

        Ok(SessionState {
            metadata: SessionMetadata {
                session_id: session_id.to_string(),
                user_id: "user".into(),
                intent: notelink::Intent::CreativeSession,
                daw: None,
                key: None,
                tempo: None,
                emotional_goal: None,
                references: Vec::new(),
                created_at: Utc::now(),
            },
            active: false,
            attributes: serde_json::Map::new(),
        })
    }

    async fn submit_frame(&self, frame: &AudioFrame) -> Result<AudioFrame> {
        if self.fail_frames.load(Ordering::SeqCst) {
            bail!("503 Service Unavailable");
        }

        self.frames.lock().unwrap().push(frame.clone());

        let mut ack = frame.clone();
        ack.rms = Some(0.1);
        ack.peak = Some(0.2);
        Ok(ack)
    }

    async fn telemetry(&self) -> Result<TelemetrySnapshot> {
        let calls = self.telemetry_calls.fetch_add(1, Ordering::SeqCst) + 1;

        if self.fail_telemetry.load(Ordering::SeqCst) {
            bail!("telemetry endpoint unreachable");
        }

        let mut values = BTreeMap::new();
        values.insert("counter.sessions.created".to_string(), calls as f64);
        values.insert("timer.audio.ingest.avg_ms".to_string(), 1.5);
        Ok(TelemetrySnapshot(values))
    }
}

// ============================================================================
// Scripted audio backend
// ============================================================================

/// Each backend emits `blocks` blocks of `BLOCK_SIZE` samples at `SAMPLE_RATE`
#[derive(Default, Clone)]
pub struct ScriptedFactory {
    pub blocks: usize,
    /// Keep the source open after the script so capture stays live
    pub hold_open: bool,
    /// Acquire the device, then fail
    pub fail_start: bool,
    pub created: Arc<AtomicUsize>,
    /// Devices currently acquired
    pub acquired: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn new(blocks: usize, hold_open: bool) -> Self {
        Self {
            blocks,
            hold_open,
            ..Default::default()
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

impl BackendFactory for ScriptedFactory {
    fn create(&self) -> Result<Box<dyn AudioBackend>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedBackend {
            script: self.clone(),
            holding: false,
            sender: None,
        }))
    }
}

struct ScriptedBackend {
    script: ScriptedFactory,
    holding: bool,
    sender: Option<mpsc::Sender<AudioBlock>>,
}

#[async_trait::async_trait]
impl AudioBackend for ScriptedBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioBlock>> {
        self.script.acquired.fetch_add(1, Ordering::SeqCst);
        self.holding = true;

        if self.script.fail_start {
            bail!("Permission denied: microphone access");
        }

        let (tx, rx) = mpsc::channel(self.script.blocks + 1);
        for i in 0..self.script.blocks {
            let level = (i + 1) as f32 / 10.0;
            tx.try_send(AudioBlock {
                samples: vec![level; BLOCK_SIZE],
                sample_rate: SAMPLE_RATE,
                captured_at_ms: 1_700_000_000_000.0 + i as f64,
            })?;
        }

        if self.script.hold_open {
            self.sender = Some(tx);
        }

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.sender = None;
        if self.holding {
            self.holding = false;
            self.script.acquired.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.holding
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// In-process stream server
// ============================================================================

#[derive(Debug, Clone)]
pub enum ServerCommand {
    Send(String),
    /// Close every open socket
    Close,
}

pub struct StreamServer {
    pub addr: SocketAddr,
    pub connections: Arc<AtomicUsize>,
    pub pings: Arc<AtomicUsize>,
    pub sessions: Arc<Mutex<Vec<String>>>,
    commands: broadcast::Sender<ServerCommand>,
}

#[derive(Clone)]
struct ServerState {
    connections: Arc<AtomicUsize>,
    pings: Arc<AtomicUsize>,
    sessions: Arc<Mutex<Vec<String>>>,
    commands: broadcast::Sender<ServerCommand>,
}

impl StreamServer {
    pub async fn start() -> Self {
        let (commands, _) = broadcast::channel(64);
        let state = ServerState {
            connections: Arc::new(AtomicUsize::new(0)),
            pings: Arc::new(AtomicUsize::new(0)),
            sessions: Arc::new(Mutex::new(Vec::new())),
            commands: commands.clone(),
        };

        let router = Router::new()
            .route("/ws/sessions/:session_id", get(upgrade))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            addr,
            connections: state.connections,
            pings: state.pings,
            sessions: state.sessions,
            commands,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn send(&self, text: impl Into<String>) {
        let _ = self.commands.send(ServerCommand::Send(text.into()));
    }

    pub fn close_all(&self) {
        let _ = self.commands.send(ServerCommand::Close);
    }
}

async fn upgrade(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<ServerState>,
) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, session_id, state))
}

async fn serve_socket(mut socket: WebSocket, session_id: String, state: ServerState) {
    let mut commands = state.commands.subscribe();
    state.sessions.lock().unwrap().push(session_id);
    state.connections.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Ok(ServerCommand::Send(text)) => {
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(ServerCommand::Close) => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },

            message = socket.recv() => match message {
                Some(Ok(Message::Text(text))) => {
                    if text == "ping" {
                        state.pings.fetch_add(1, Ordering::SeqCst);
                        let _ = socket.send(Message::Text("pong".into())).await;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
