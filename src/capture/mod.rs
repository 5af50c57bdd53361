//! Live audio capture
//!
//! Binds an audio backend to the active session and submits every captured
//! block as an audio frame. Capture stops by itself when its session closes.

mod pipeline;

pub use pipeline::{CapturePipeline, CaptureStats};
