//! Gateway opcodes and wire-format messages shared by hub and client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::DomainEventKind;
use crate::room::RoomKey;
use crate::session::SessionResponse;

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_JOIN: u8 = 2;
pub const OP_LEAVE: u8 = 3;
pub const OP_PUBLISH: u8 = 4;
pub const OP_HEARTBEAT_ACK: u8 = 6;

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

/// A message sent from the hub to the client over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    pub d: Value,
}

impl GatewayMessage {
    /// Build a DISPATCH message (op=0).
    pub fn dispatch(event_name: &str, seq: u64, data: Value) -> Self {
        Self {
            op: OP_DISPATCH,
            t: Some(event_name.to_string()),
            s: Some(seq),
            d: data,
        }
    }

    /// Build a HEARTBEAT_ACK message (op=6).
    pub fn heartbeat_ack(seq: u64) -> Self {
        Self {
            op: OP_HEARTBEAT_ACK,
            t: None,
            s: None,
            d: serde_json::json!({ "ack": seq }),
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// A message received from the client over WebSocket.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientMessage {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

impl ClientMessage {
    pub fn join(payload: &JoinPayload) -> Self {
        Self {
            op: OP_JOIN,
            d: serde_json::to_value(payload).unwrap_or_default(),
        }
    }

    pub fn leave() -> Self {
        Self {
            op: OP_LEAVE,
            d: Value::Null,
        }
    }

    pub fn publish(kind: &DomainEventKind) -> Self {
        Self {
            op: OP_PUBLISH,
            d: serde_json::to_value(kind).unwrap_or_default(),
        }
    }

    pub fn heartbeat(seq: u64) -> Self {
        Self {
            op: OP_HEARTBEAT,
            d: serde_json::json!({ "seq": seq }),
        }
    }
}

// ---------------------------------------------------------------------------
// JOIN payload
// ---------------------------------------------------------------------------

/// Sent as the first frame on a new connection. A connection belongs to at
/// most one room, so later frames carry no room argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinPayload {
    pub room: RoomKey,
    pub participant_id: String,
    pub display_name: String,
    pub wants_leadership: bool,
}

// ---------------------------------------------------------------------------
// HEARTBEAT payload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub seq: u64,
}

// ---------------------------------------------------------------------------
// Dispatch payloads
// ---------------------------------------------------------------------------

/// A room member as seen in presence snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub id: String,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

/// Payload of the JOINED dispatch sent directly to a joiner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinedPayload {
    pub room: RoomKey,
    pub is_leader: bool,
    pub leader_id: Option<String>,
    pub participants: Vec<ParticipantInfo>,
    /// Latest section-notes text per section, for late joiners.
    #[serde(default)]
    pub notes: std::collections::HashMap<String, String>,
    /// Current rating submissions, for late joiners.
    pub ratings: RatingsSummary,
    /// The active durable session for this room's key, if one exists.
    pub session: Option<SessionResponse>,
    pub heartbeat_interval_ms: u64,
}

/// Payload of the PRESENCE_CHANGED dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceChangedPayload {
    pub participants: Vec<ParticipantInfo>,
    pub leader_id: Option<String>,
}

/// One submitted meeting rating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingEntry {
    pub participant_id: String,
    pub display_name: String,
    pub rating: f32,
    pub submitted_at: DateTime<Utc>,
}

/// Running aggregate of rating submissions, re-broadcast on every submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatingsSummary {
    pub total_participants: usize,
    pub total_ratings: usize,
    pub average_rating: f32,
    pub ratings: Vec<RatingEntry>,
}

/// Payload of an ERROR dispatch sent only to the offending connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_envelope_shape() {
        let msg = GatewayMessage::dispatch("VOTE", 3, serde_json::json!({ "issue_id": "i1" }));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["op"], 0);
        assert_eq!(json["t"], "VOTE");
        assert_eq!(json["s"], 3);
        assert_eq!(json["d"]["issue_id"], "i1");
    }

    #[test]
    fn heartbeat_ack_omits_t_and_s() {
        let json = serde_json::to_value(GatewayMessage::heartbeat_ack(7)).unwrap();
        assert_eq!(json["op"], 6);
        assert!(json.get("t").is_none());
        assert!(json.get("s").is_none());
    }

    #[test]
    fn join_message_carries_structured_room() {
        let payload = JoinPayload {
            room: RoomKey::new("org1", "team1", "quarterly"),
            participant_id: "prt_a".into(),
            display_name: "Ann".into(),
            wants_leadership: true,
        };
        let msg = ClientMessage::join(&payload);
        assert_eq!(msg.op, OP_JOIN);
        assert_eq!(msg.d["room"]["team_id"], "team1");
        assert_eq!(msg.d["wants_leadership"], true);
    }
}
