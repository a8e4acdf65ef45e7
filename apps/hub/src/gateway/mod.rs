//! The real-time meeting gateway: rooms, presence/leadership, fan-out, and
//! the per-connection WebSocket loop.

pub mod conn;
pub mod fanout;
pub mod presence;
pub mod rooms;
pub mod server;
