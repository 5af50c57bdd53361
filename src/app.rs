use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::audio::{AudioBackendConfig, AudioBackendFactory, AudioSource, BackendFactory};
use crate::capture::CapturePipeline;
use crate::config::Config;
use crate::remote::{parse_base_url, HttpSessionService, SessionService};
use crate::session::{SessionContext, SessionController, SessionTeardown};
use crate::stream::{EventStreamClient, StreamSettings};
use crate::telemetry::TelemetryPoller;

/// All components wired together around one `SessionContext`
pub struct App {
    config: Config,
    controller: Arc<SessionController>,
    capture: Arc<CapturePipeline>,
    telemetry: Arc<TelemetryPoller>,
    cancel: CancellationToken,
    telemetry_task: Mutex<Option<JoinHandle<()>>>,
}

impl App {
    /// Build against the configured remote service and audio source
    pub fn new(config: Config) -> Result<Self> {
        let service = Arc::new(HttpSessionService::new(
            &config.service.base_url,
            config.service.request_timeout(),
        )?);

        let source: AudioSource = config
            .capture
            .source
            .parse()
            .context("Invalid capture.source")?;

        let factory = Arc::new(AudioBackendFactory::new(
            source,
            AudioBackendConfig {
                block_size: config.capture.block_size,
                queue_depth: config.capture.queue_depth,
                realtime: true,
            },
        ));

        Self::with_parts(config, service, factory)
    }

    /// Build with an explicit service and backend factory
    pub fn with_parts(
        config: Config,
        service: Arc<dyn SessionService>,
        backends: Arc<dyn BackendFactory>,
    ) -> Result<Self> {
        let base_url = parse_base_url(&config.service.base_url)?;
        let context = SessionContext::new();

        let stream = EventStreamClient::new(base_url, StreamSettings::from(&config.stream), context.clone());
        let controller = Arc::new(SessionController::new(service.clone(), context, stream));

        let capture = Arc::new(CapturePipeline::new(
            controller.clone(),
            backends,
            config.capture.max_in_flight,
        ));
        let hook: Arc<dyn SessionTeardown> = capture.clone();
        controller.register_teardown(Arc::downgrade(&hook));

        let telemetry = Arc::new(TelemetryPoller::new(service, config.telemetry.poll_interval()));

        Ok(Self {
            config,
            controller,
            capture,
            telemetry,
            cancel: CancellationToken::new(),
            telemetry_task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    pub fn capture(&self) -> &Arc<CapturePipeline> {
        &self.capture
    }

    pub fn telemetry(&self) -> &Arc<TelemetryPoller> {
        &self.telemetry
    }

    /// Start background telemetry polling. No-op if already started.
    pub async fn start(&self) {
        let mut task = self.telemetry_task.lock().await;
        if task.is_none() {
            *task = Some(self.telemetry.spawn(self.cancel.child_token()));
        }
    }

    /// Stop capture, close the session and stop polling
    pub async fn shutdown(&self) {
        info!("Shutting down");

        self.capture.stop_capture().await;
        self.controller.shutdown().await;

        self.cancel.cancel();
        if let Some(task) = self.telemetry_task.lock().await.take() {
            let _ = task.await;
        }
    }
}
