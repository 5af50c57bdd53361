use anyhow::{bail, Context, Result};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

use super::messages::{AudioFrame, SessionState, TelemetrySnapshot};
use crate::session::SessionRequest;

/// Remote session service as seen by the client
#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    /// Create a session; the service assigns `session_id` and `created_at`
    async fn create_session(&self, request: &SessionRequest) -> Result<SessionState>;

    /// Close a session. Idempotent on an already-closed session.
    async fn close_session(&self, session_id: &str) -> Result<SessionState>;

    /// Submit one frame; the acknowledgement may carry `rms`/`peak`
    async fn submit_frame(&self, frame: &AudioFrame) -> Result<AudioFrame>;

    /// Aggregate counters, no side effects
    async fn telemetry(&self) -> Result<TelemetrySnapshot>;
}

/// `SessionService` over the service's REST endpoints
pub struct HttpSessionService {
    client: Client,
    base_url: Url,
}

impl HttpSessionService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = parse_base_url(base_url)?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        info!("Remote session service at {}", base_url);

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        join_segments(&self.base_url, segments)
    }
}

#[async_trait::async_trait]
impl SessionService for HttpSessionService {
    async fn create_session(&self, request: &SessionRequest) -> Result<SessionState> {
        let url = self.endpoint(&["sessions"])?;
        debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .context("Create session request failed")?;

        read_json(response).await
    }

    async fn close_session(&self, session_id: &str) -> Result<SessionState> {
        let url = self.endpoint(&["sessions", session_id, "close"])?;
        debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Close session request failed")?;

        read_json(response).await
    }

    async fn submit_frame(&self, frame: &AudioFrame) -> Result<AudioFrame> {
        let url = self.endpoint(&["sessions", &frame.session_id, "audio"])?;

        let response = self
            .client
            .post(url)
            .json(frame)
            .send()
            .await
            .context("Audio frame request failed")?;

        read_json(response).await
    }

    async fn telemetry(&self) -> Result<TelemetrySnapshot> {
        let url = self.endpoint(&["telemetry"])?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Telemetry request failed")?;

        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("Service responded {}: {}", status, body.trim());
    }

    response
        .json::<T>()
        .await
        .context("Failed to decode service response")
}

/// Parse the configured base address; only http(s) is accepted
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("Invalid service base URL: {}", raw))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => bail!("Unsupported service URL scheme: {}", other),
    }
}

/// Session stream endpoint: same host and path prefix, websocket scheme
pub fn stream_url(base_url: &Url, session_id: &str) -> Result<Url> {
    let mut url = base_url.clone();

    let scheme = match base_url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => bail!("Cannot derive stream endpoint from scheme: {}", other),
    };
    if url.set_scheme(scheme).is_err() {
        bail!("Failed to upgrade {} to {}", base_url, scheme);
    }

    join_segments(&url, &["ws", "sessions", session_id])
}

fn join_segments(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.set_query(None);
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("Base URL cannot carry a path: {}", base))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
