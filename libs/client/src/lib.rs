//! Client library for the cadence meeting hub.
//!
//! Wraps the gateway WebSocket protocol and the session REST API behind a
//! [`MeetingClient`]: join a room, publish collaboration events, mirror the
//! shared timer, and resync after reconnects.

pub mod config;
pub mod error;
pub mod meeting;
pub mod sessions;
pub mod timer;
pub mod transport;

pub use config::{ClientConfig, SendPolicy};
pub use error::ClientError;
pub use meeting::{MeetingClient, MeetingEvent};
pub use sessions::{ActiveRoom, SessionClient};
pub use timer::{LeaderTimerControl, TimerState, TimerView};
pub use transport::{Transport, TransportEvent};
