//! Live-room queries: "does a meeting already exist for this room?"
//!
//! Clients call this before joining to decide whether to request leadership.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cadence_common::protocol::ParticipantInfo;
use cadence_common::RoomKey;

use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/rooms/active", get(get_active_room))
}

#[derive(Debug, Deserialize)]
pub struct ActiveRoomQuery {
    pub organization_id: String,
    pub team_id: String,
    pub meeting_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomSummary {
    pub key: String,
    pub participant_count: usize,
    pub leader_id: Option<String>,
    pub participants: Vec<ParticipantInfo>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveRoomResponse {
    pub room: Option<RoomSummary>,
}

async fn get_active_room(
    State(state): State<AppState>,
    Query(query): Query<ActiveRoomQuery>,
) -> Result<Json<ActiveRoomResponse>, ApiError> {
    let key = RoomKey::new(query.organization_id, query.team_id, query.meeting_type);
    let room = state
        .presence
        .registry()
        .snapshot(&key.to_string())
        .map(|snapshot| RoomSummary {
            key: snapshot.key.to_string(),
            participant_count: snapshot.participants.len(),
            leader_id: snapshot.leader_id,
            participants: snapshot.participants,
            created_at: snapshot.created_at,
        });
    Ok(Json(ActiveRoomResponse { room }))
}
