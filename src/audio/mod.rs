pub mod backend;
pub mod file;
pub mod slicer;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioBlock, AudioSource, BackendFactory,
};
pub use file::{AudioFile, FileBackend};
pub use slicer::BlockSlicer;
