mod poller;

pub use poller::{TelemetryPoller, TelemetryState};
