//! REST client for the hub's durable session endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cadence_common::protocol::ParticipantInfo;
use cadence_common::room::RoomKey;
use cadence_common::session::SessionResponse;

use crate::error::ClientError;

#[derive(Debug, Serialize)]
struct StartSessionRequest<'a> {
    organization_id: &'a str,
    team_id: &'a str,
    meeting_type: &'a str,
    facilitator_id: &'a str,
}

/// Error body shape returned by the hub.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// A live room as reported by `GET /rooms/active`, queried before joining so
/// the caller can decide whether to request leadership.
#[derive(Debug, Clone, Deserialize)]
pub struct ActiveRoom {
    pub key: String,
    pub participant_count: usize,
    pub leader_id: Option<String>,
    pub participants: Vec<ParticipantInfo>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ActiveRoomResponse {
    room: Option<ActiveRoom>,
}

/// Thin typed wrapper over the hub's `/api/v1` session routes.
#[derive(Debug, Clone)]
pub struct SessionClient {
    http: reqwest::Client,
    base: String,
}

impl SessionClient {
    /// `base` is the versioned API root, e.g. `http://127.0.0.1:4040/api/v1`.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into(),
        }
    }

    /// Start a durable session for the room key. At most one active or
    /// paused session may exist per key; a second start fails with
    /// [`ClientError::SessionConflict`].
    pub async fn start(
        &self,
        room: &RoomKey,
        facilitator_id: &str,
    ) -> Result<SessionResponse, ClientError> {
        let response = self
            .http
            .post(format!("{}/sessions", self.base))
            .json(&StartSessionRequest {
                organization_id: &room.organization_id,
                team_id: &room.team_id,
                meeting_type: &room.meeting_type,
                facilitator_id,
            })
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn pause(&self, session_id: &str) -> Result<SessionResponse, ClientError> {
        let response = self
            .http
            .post(format!("{}/sessions/{session_id}/pause", self.base))
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn resume(&self, session_id: &str) -> Result<SessionResponse, ClientError> {
        let response = self
            .http
            .post(format!("{}/sessions/{session_id}/resume", self.base))
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Conclude the session. Ending an already-concluded session is treated
    /// as success with no body: from the caller's perspective the meeting is
    /// over either way.
    pub async fn end(&self, session_id: &str) -> Result<Option<SessionResponse>, ClientError> {
        let response = self
            .http
            .post(format!("{}/sessions/{session_id}/end", self.base))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(Some(response.json().await?));
        }
        let body: ErrorBody = response
            .json()
            .await
            .map_err(|_| ClientError::Protocol(format!("unexpected error body ({status})")))?;
        if body.error.code == "ALREADY_CONCLUDED" {
            return Ok(None);
        }
        Err(Self::map_error(body))
    }

    /// The active or paused session for a room key, if any.
    pub async fn get_active(&self, room: &RoomKey) -> Result<Option<SessionResponse>, ClientError> {
        let response = self
            .http
            .get(format!("{}/sessions/active", self.base))
            .query(&[
                ("organization_id", room.organization_id.as_str()),
                ("team_id", room.team_id.as_str()),
                ("meeting_type", room.meeting_type.as_str()),
            ])
            .send()
            .await?;
        Self::decode(response).await
    }

    /// The live in-memory room for a key, if one exists right now.
    pub async fn active_room(&self, room: &RoomKey) -> Result<Option<ActiveRoom>, ClientError> {
        let response = self
            .http
            .get(format!("{}/rooms/active", self.base))
            .query(&[
                ("organization_id", room.organization_id.as_str()),
                ("team_id", room.team_id.as_str()),
                ("meeting_type", room.meeting_type.as_str()),
            ])
            .send()
            .await?;
        let body: ActiveRoomResponse = Self::decode(response).await?;
        Ok(body.room)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body: ErrorBody = response
            .json()
            .await
            .map_err(|_| ClientError::Protocol(format!("unexpected error body ({status})")))?;
        Err(Self::map_error(body))
    }

    fn map_error(body: ErrorBody) -> ClientError {
        match body.error.code.as_str() {
            "SESSION_CONFLICT" => ClientError::SessionConflict,
            "INVALID_STATE" | "ALREADY_CONCLUDED" => ClientError::InvalidState(body.error.message),
            "NOT_FOUND" => ClientError::SessionNotFound,
            _ => ClientError::Protocol(format!("{}: {}", body.error.code, body.error.message)),
        }
    }
}
