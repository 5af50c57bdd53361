pub mod app;
pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod http;
pub mod remote;
pub mod session;
pub mod stream;
pub mod telemetry;

pub use app::App;
pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioBlock, AudioFile, AudioSource,
    BackendFactory, BlockSlicer, FileBackend,
};
pub use capture::{CapturePipeline, CaptureStats};
pub use config::Config;
pub use error::{ClientError, Result};
pub use http::{create_router, AppState};
pub use remote::{
    AudioFrame, HttpSessionService, Intent, SessionEvent, SessionMetadata, SessionService,
    SessionState, TelemetrySnapshot,
};
pub use session::{SessionContext, SessionController, SessionRequest, SessionStats, SessionTeardown};
pub use stream::{EventFeed, EventStreamClient, StreamSettings, StreamStatus};
pub use telemetry::{TelemetryPoller, TelemetryState};
