//! Per-connection gateway state.

use std::sync::atomic::{AtomicU64, Ordering};

/// State for a single WebSocket connection. A connection belongs to exactly
/// one room for its whole lifetime; a reconnect is a new connection.
pub struct GatewayConn {
    /// Volatile connection identifier (`con_` prefixed ULID).
    pub connection_id: String,
    /// The joined participant; stable across reconnects.
    pub participant_id: String,
    pub display_name: String,
    /// String form of the joined room's key.
    pub room_key: String,
    /// Monotonically increasing sequence number for dispatch events.
    seq: AtomicU64,
}

impl GatewayConn {
    pub fn new(
        connection_id: String,
        participant_id: String,
        display_name: String,
        room_key: String,
    ) -> Self {
        Self {
            connection_id,
            participant_id,
            display_name,
            room_key,
            seq: AtomicU64::new(0),
        }
    }

    /// Get the next sequence number for a dispatch event.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}
