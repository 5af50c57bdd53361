use anyhow::{bail, Result};
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::remote::messages::duration_ms;

/// One fixed-size block of mono samples.
///
/// Always owned: backends copy samples out of the device buffer before building
/// a block, since the device reuses that buffer for the next callback.
#[derive(Debug, Clone)]
pub struct AudioBlock {
    /// Mono f32 samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Native sample rate of the input device in Hz
    pub sample_rate: u32,
    /// Capture time in milliseconds since the Unix epoch
    pub captured_at_ms: f64,
}

impl AudioBlock {
    pub fn duration_ms(&self) -> f64 {
        duration_ms(self.samples.len(), self.sample_rate)
    }
}

/// Configuration for audio backends
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Samples per block
    pub block_size: usize,
    /// Blocks buffered between the producer and the pipeline; overflow is dropped
    pub queue_depth: usize,
    /// Pace file sources at the speed of the audio instead of as fast as possible
    pub realtime: bool,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            block_size: 4096,
            queue_depth: 32,
            realtime: true,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal default input device (`microphone` feature)
/// - File: WAV file played back as if it were live input
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Acquire the source and start producing blocks.
    ///
    /// On error nothing stays acquired.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioBlock>>;

    /// Disconnect the source and release the device
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Creates a fresh backend for every capture run
pub trait BackendFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn AudioBackend>>;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default input device
    Microphone,
    /// WAV file input (offline runs, testing)
    File(PathBuf),
}

impl std::str::FromStr for AudioSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "microphone" | "mic" => Ok(Self::Microphone),
            other => match other.strip_prefix("file:") {
                Some(path) if !path.is_empty() => Ok(Self::File(PathBuf::from(path))),
                _ => bail!("Unknown audio source {:?} (expected `microphone` or `file:<path>`)", s),
            },
        }
    }
}

/// Audio backend factory for the configured source
pub struct AudioBackendFactory {
    source: AudioSource,
    config: AudioBackendConfig,
}

impl AudioBackendFactory {
    pub fn new(source: AudioSource, config: AudioBackendConfig) -> Self {
        Self { source, config }
    }

    pub fn source(&self) -> &AudioSource {
        &self.source
    }
}

impl BackendFactory for AudioBackendFactory {
    fn create(&self) -> Result<Box<dyn AudioBackend>> {
        match &self.source {
            AudioSource::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    use super::microphone::MicrophoneBackend;
                    Ok(Box::new(MicrophoneBackend::new(self.config.clone())))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    bail!("Microphone capture requires building with the `microphone` feature")
                }
            }

            AudioSource::File(path) => {
                use super::file::FileBackend;
                Ok(Box::new(FileBackend::new(path.clone(), self.config.clone())))
            }
        }
    }
}
