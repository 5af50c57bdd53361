use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Default config file looked up when no `--config` is given (extension optional).
pub const DEFAULT_CONFIG_PATH: &str = "config/notelink";

/// Environment variables override file values, e.g. `NOTELINK_SERVICE__BASE_URL`.
pub const ENV_PREFIX: &str = "NOTELINK";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub stream: StreamConfig,
    pub capture: CaptureConfig,
    pub telemetry: TelemetryConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Base address of the remote session service (`http://` or `https://`)
    pub base_url: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub reconnect_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub feed_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Samples per frame
    pub block_size: usize,
    /// Blocks buffered between the device callback and the pipeline
    pub queue_depth: usize,
    /// Frame submissions allowed in flight before new blocks are dropped
    pub max_in_flight: usize,
    /// `microphone` or `file:<path to wav>`
    pub source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Config {
    /// Load configuration: built-in defaults, then the optional file at `path`,
    /// then `NOTELINK_*` environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = Self::builder()?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Reject values that would stall or panic a background loop
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("stream.reconnect_delay_ms", self.stream.reconnect_delay_ms),
            ("stream.heartbeat_interval_ms", self.stream.heartbeat_interval_ms),
            ("stream.feed_capacity", self.stream.feed_capacity as u64),
            ("capture.block_size", self.capture.block_size as u64),
            ("capture.queue_depth", self.capture.queue_depth as u64),
            ("capture.max_in_flight", self.capture.max_in_flight as u64),
            ("telemetry.poll_interval_ms", self.telemetry.poll_interval_ms),
        ];

        for (key, value) in non_zero {
            if value == 0 {
                bail!("{} must be greater than zero", key);
            }
        }

        Ok(())
    }

    /// Built-in defaults only, no file or environment lookups
    pub fn defaults() -> Result<Self> {
        let settings = Self::builder()?.build()?;
        Ok(settings.try_deserialize()?)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(config::Config::builder()
            .set_default("service.base_url", "http://localhost:8000")?
            .set_default("service.request_timeout_ms", 10_000)?
            .set_default("stream.reconnect_delay_ms", 1_500)?
            .set_default("stream.heartbeat_interval_ms", 30_000)?
            .set_default("stream.feed_capacity", 100)?
            .set_default("capture.block_size", 4096)?
            .set_default("capture.queue_depth", 32)?
            .set_default("capture.max_in_flight", 8)?
            .set_default("capture.source", "microphone")?
            .set_default("telemetry.poll_interval_ms", 5_000)?
            .set_default("http.bind", "127.0.0.1")?
            .set_default("http.port", 8765)?)
    }
}

impl ServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl StreamConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

impl TelemetryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
