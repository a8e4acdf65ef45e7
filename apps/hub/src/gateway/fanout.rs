//! Broadcast hub for fanning room events out to connected clients.
//!
//! A single `tokio::sync::broadcast` channel per process; each connection
//! subscribes and filters locally by room key and originator. Delivery is
//! fire-and-forget: no acknowledgement, no retry — a missed event is
//! superseded by the next state-bearing event or a full resync on reconnect.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use cadence_common::events::DomainEvent;

/// Capacity of the broadcast channel. Slow receivers that fall behind will
/// skip messages (RecvError::Lagged).
const BROADCAST_CAPACITY: usize = 4096;

/// A payload broadcast to all connected gateway sessions.
#[derive(Debug, Clone)]
pub struct RoomDispatch {
    /// String form of the room key this event belongs to.
    pub room_key: String,
    /// `None` for server-originated dispatches, which every room member
    /// receives; otherwise the publishing participant, excluded on delivery.
    pub originator_id: Option<String>,
    /// The dispatch event name (e.g. "TIMER_PAUSED").
    pub event_name: String,
    /// Serialized event data.
    pub data: Value,
}

impl RoomDispatch {
    /// Wrap a domain event for fan-out; the event name is derived from its
    /// kind and the originator from the event itself.
    pub fn from_event(room_key: &str, event: &DomainEvent) -> Self {
        Self {
            room_key: room_key.to_string(),
            originator_id: event.originator_id.clone(),
            event_name: event.kind.event_name().to_string(),
            data: serde_json::to_value(event).unwrap_or_default(),
        }
    }

    /// Build a server-originated dispatch, delivered to all room members.
    pub fn server(room_key: &str, event_name: &str, data: Value) -> Self {
        Self {
            room_key: room_key.to_string(),
            originator_id: None,
            event_name: event_name.to_string(),
            data,
        }
    }

    /// Whether a given participant's connection should receive this dispatch.
    pub fn deliverable_to(&self, room_key: &str, participant_id: &str) -> bool {
        self.room_key == room_key && self.originator_id.as_deref() != Some(participant_id)
    }
}

/// The global broadcast hub. Cloneable — store in AppState.
#[derive(Clone)]
pub struct GatewayBroadcast {
    sender: broadcast::Sender<Arc<RoomDispatch>>,
}

impl GatewayBroadcast {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Subscribe to the broadcast channel. Each gateway connection calls this
    /// once to get its own receiver; a reconnect means a fresh subscription on
    /// the new connection and the old one torn down with its task.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RoomDispatch>> {
        self.sender.subscribe()
    }

    /// Publish a dispatch to all connected sessions.
    pub fn dispatch(&self, payload: RoomDispatch) {
        // send() returns Err if there are no receivers — that's fine.
        let _ = self.sender.send(Arc::new(payload));
    }
}

impl Default for GatewayBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_common::events::DomainEventKind;
    use chrono::Utc;

    #[test]
    fn originator_is_excluded_from_delivery() {
        let event = DomainEvent {
            originator_id: Some("prt_a".into()),
            timestamp: Utc::now(),
            kind: DomainEventKind::Vote {
                issue_id: "i1".into(),
                delta: 1,
            },
        };
        let dispatch = RoomDispatch::from_event("org1-team1-quarterly", &event);
        assert!(!dispatch.deliverable_to("org1-team1-quarterly", "prt_a"));
        assert!(dispatch.deliverable_to("org1-team1-quarterly", "prt_b"));
        assert!(!dispatch.deliverable_to("other-room-weekly", "prt_b"));
    }

    #[test]
    fn server_dispatch_reaches_everyone_in_room() {
        let dispatch = RoomDispatch::server(
            "org1-team1-quarterly",
            "PRESENCE_CHANGED",
            serde_json::json!({}),
        );
        assert!(dispatch.deliverable_to("org1-team1-quarterly", "prt_a"));
        assert!(dispatch.deliverable_to("org1-team1-quarterly", "prt_b"));
    }

    #[tokio::test]
    async fn publish_order_is_preserved_per_subscriber() {
        let hub = GatewayBroadcast::new();
        let mut rx = hub.subscribe();

        for i in 0..5 {
            hub.dispatch(RoomDispatch::server("r", "EVENT", serde_json::json!({ "i": i })));
        }
        for i in 0..5 {
            let got = rx.recv().await.unwrap();
            assert_eq!(got.data["i"], i);
        }
    }
}
