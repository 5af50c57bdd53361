//! Session event stream
//!
//! A websocket scoped to one session id that:
//! - validates every inbound message before it reaches the feed
//! - keeps the newest events in a fixed-capacity, newest-first feed
//! - sends liveness pings on a fixed interval
//! - reconnects after a fixed delay, but only while its session is still active

mod client;
mod feed;
mod state;

pub use client::{EventStreamClient, StreamSettings};
pub use feed::EventFeed;
pub use state::StreamStatus;
pub(crate) use state::SessionFence;
