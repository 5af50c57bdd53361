pub mod client;
pub mod messages;

pub use client::{parse_base_url, stream_url, HttpSessionService, SessionService};
pub use messages::{
    AudioFrame, Intent, SessionEvent, SessionMetadata, SessionState, TelemetrySnapshot,
};
