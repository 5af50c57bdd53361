use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioBlock};
use super::slicer::BlockSlicer;
use crate::session::now_ms;

/// A WAV file decoded to interleaved f32 samples
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        if spec.sample_rate == 0 || spec.channels == 0 {
            bail!("WAV header declares {}Hz / {} channels", spec.sample_rate, spec.channels);
        }

        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            SampleFormat::Int => {
                let scale = 1.0 / (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read audio samples")?
            }
        };

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Plays a WAV file into the pipeline as if it were a live input device.
///
/// With `realtime` set, blocks are paced at the audio's own rate and dropped
/// when the queue is full, exactly like a device callback. Otherwise the file
/// is pushed as fast as the consumer drains it. The trailing partial block is
/// discarded.
pub struct FileBackend {
    path: PathBuf,
    config: AudioBackendConfig,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: PathBuf, config: AudioBackendConfig) -> Self {
        Self {
            path,
            config,
            cancel: None,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioBlock>> {
        if self.task.is_some() {
            bail!("Already capturing");
        }

        let path = self.path.clone();
        let file = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .context("WAV decode task panicked")??;

        let (tx, rx) = mpsc::channel(self.config.queue_depth.max(1));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(play(file, self.config.clone(), tx, cancel.clone()));

        self.cancel = Some(cancel);
        self.task = Some(task);

        info!("File capture started: {}", self.path.display());

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }

        if let Some(task) = self.task.take() {
            task.await.context("File playback task panicked")?;
            info!("File capture stopped: {}", self.path.display());
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    fn name(&self) -> &str {
        "file"
    }
}

async fn play(
    file: AudioFile,
    config: AudioBackendConfig,
    tx: mpsc::Sender<AudioBlock>,
    cancel: CancellationToken,
) {
    let block_size = config.block_size.max(1);
    let sample_rate = file.sample_rate;
    let channels = file.channels as usize;

    let mut slicer = BlockSlicer::new(block_size, file.channels);
    let mut pacing = tokio::time::interval(Duration::from_secs_f64(
        block_size as f64 / sample_rate as f64,
    ));
    pacing.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut sent = 0usize;
    let mut dropped = 0usize;

    // Feed the slicer one block's worth of interleaved input at a time
    for chunk in file.samples.chunks(block_size * channels) {
        let mut ready = Vec::new();
        slicer.push(chunk, |samples| ready.push(samples));

        for samples in ready {
            if config.realtime {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = pacing.tick() => {}
                }
            }

            let block = AudioBlock {
                samples,
                sample_rate,
                captured_at_ms: now_ms(),
            };

            if config.realtime {
                match tx.try_send(block) {
                    Ok(()) => sent += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        dropped += 1;
                        warn!("Capture queue full, dropping block");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => return,
                }
            } else {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    result = tx.send(block) => {
                        if result.is_err() {
                            return;
                        }
                        sent += 1;
                    }
                }
            }
        }
    }

    let tail = slicer.discard();
    debug!(
        "File playback finished: {} blocks sent, {} dropped, {} trailing samples discarded",
        sent, dropped, tail
    );
}
