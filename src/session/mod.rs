//! Session lifecycle
//!
//! This module provides the `SessionController` that manages:
//! - Creating and closing the single active session on the remote service
//! - Publishing the active session id through the shared `SessionContext`
//! - Opening the session's event stream and tearing it down on close
//! - Submitting audio frames on behalf of the active session

mod context;
mod controller;
mod request;
mod stats;

pub use context::SessionContext;
pub use controller::{SessionController, SessionTeardown};
pub(crate) use controller::now_ms;
pub use request::SessionRequest;
pub use stats::SessionStats;
