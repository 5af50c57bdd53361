use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{describe, ClientError, Result};
use crate::remote::{SessionService, TelemetrySnapshot};

/// What readers see: the last good snapshot plus freshness
#[derive(Debug, Clone, Default, Serialize)]
pub struct TelemetryState {
    pub snapshot: Option<TelemetrySnapshot>,
    pub fetched_at: Option<DateTime<Utc>>,
    /// Set when the most recent poll failed; cleared by the next success
    pub stale: bool,
    pub last_error: Option<String>,
    pub polls: u64,
    pub failures: u64,
}

/// Periodically pulls the service's aggregate telemetry.
///
/// Independent of session state. Each success replaces the snapshot wholesale.
pub struct TelemetryPoller {
    service: Arc<dyn SessionService>,
    interval: Duration,
    state: RwLock<TelemetryState>,
}

impl TelemetryPoller {
    pub fn new(service: Arc<dyn SessionService>, interval: Duration) -> Self {
        Self {
            service,
            // tokio's interval panics on zero
            interval: interval.max(Duration::from_millis(1)),
            state: RwLock::new(TelemetryState::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll now. A failure keeps the previous snapshot and marks it stale.
    pub async fn poll_once(&self) -> Result<TelemetrySnapshot> {
        let result = self.service.telemetry().await;
        let mut state = self.state.write().await;
        state.polls += 1;

        match result {
            Ok(snapshot) => {
                debug!("Telemetry refreshed ({} entries)", snapshot.len());
                state.snapshot = Some(snapshot.clone());
                state.fetched_at = Some(Utc::now());
                state.stale = false;
                state.last_error = None;
                Ok(snapshot)
            }
            Err(e) => {
                let err = ClientError::TelemetryFetch(describe(&e));
                state.stale = true;
                state.failures += 1;
                state.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub async fn state(&self) -> TelemetryState {
        self.state.read().await.clone()
    }

    /// Poll on a fixed interval until `cancel` fires
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let poller = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poller.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            info!("Telemetry polling every {:?}", poller.interval);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = poller.poll_once().await {
                            warn!("{}", e);
                        }
                    }
                }
            }

            info!("Telemetry polling stopped");
        })
    }
}
