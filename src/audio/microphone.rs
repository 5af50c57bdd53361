use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioBlock};
use super::slicer::{i16_to_f32, BlockSlicer};
use crate::session::now_ms;

/// Default input device via cpal.
///
/// `cpal::Stream` is not `Send`, so the stream lives on its own thread for the
/// whole capture run. Dropping it on that thread releases the device.
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    worker: Option<Worker>,
}

struct Worker {
    stop_tx: std::sync::mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            worker: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioBlock>> {
        if self.worker.is_some() {
            bail!("Already capturing");
        }

        let (tx, rx) = mpsc::channel(self.config.queue_depth.max(1));
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let block_size = self.config.block_size;

        let thread = std::thread::Builder::new()
            .name("notelink-microphone".into())
            .spawn(move || {
                let stream = match open_input_stream(block_size, tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(anyhow!("Failed to start input stream: {}", e)));
                    return;
                }

                let _ = ready_tx.send(Ok(()));

                // Parked until stop() or the backend is dropped
                let _ = stop_rx.recv();

                if let Err(e) = stream.pause() {
                    warn!("Failed to pause input stream: {}", e);
                }
                drop(stream);
            })
            .context("Failed to spawn microphone thread")?;

        match ready_rx.await {
            Ok(Ok(())) => {
                self.worker = Some(Worker { stop_tx, thread });
                info!("Microphone capture started");
                Ok(rx)
            }
            Ok(Err(e)) => {
                let _ = tokio::task::spawn_blocking(move || thread.join()).await;
                Err(e)
            }
            Err(_) => bail!("Microphone thread exited before the device was ready"),
        }
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        let _ = worker.stop_tx.send(());
        tokio::task::spawn_blocking(move || worker.thread.join())
            .await
            .context("Failed to join microphone thread")?
            .map_err(|_| anyhow!("Microphone thread panicked"))?;

        info!("Microphone capture stopped, device released");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

fn open_input_stream(block_size: usize, tx: mpsc::Sender<AudioBlock>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("No default input device available")?;
    let supported = device
        .default_input_config()
        .context("Failed to query input device config")?;

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let stream_config: cpal::StreamConfig = supported.config();

    info!(
        "Opening input device {} ({}Hz, {} channels, {:?})",
        device.name().unwrap_or_else(|_| "unknown".into()),
        sample_rate,
        channels,
        supported.sample_format()
    );

    let mut slicer = BlockSlicer::new(block_size, channels);
    let err_fn = |e: cpal::StreamError| error!("Input stream error: {}", e);

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                slicer.push(data, |samples| forward(&tx, samples, sample_rate));
            },
            err_fn,
            None,
        )?,
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let converted: Vec<f32> = data.iter().copied().map(i16_to_f32).collect();
                slicer.push(&converted, |samples| forward(&tx, samples, sample_rate));
            },
            err_fn,
            None,
        )?,
        other => bail!("Unsupported input sample format: {:?}", other),
    };

    Ok(stream)
}

/// Hand a block to the pipeline without blocking the audio thread
fn forward(tx: &mpsc::Sender<AudioBlock>, samples: Vec<f32>, sample_rate: u32) {
    let block = AudioBlock {
        samples,
        sample_rate,
        captured_at_ms: now_ms(),
    };

    if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(block) {
        warn!("Capture queue full, dropping block");
    }
}
