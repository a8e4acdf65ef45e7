//! Session persistence endpoints: start/pause/resume/end/get-active.
//!
//! Every response carries the server-computed `active_duration_seconds`, the
//! authoritative figure client timers reconcile against.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use cadence_common::session::{MeetingSession, SessionResponse};

use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(start_session))
        .route("/sessions/active", get(get_active_session))
        .route("/sessions/{id}/pause", post(pause_session))
        .route("/sessions/{id}/resume", post(resume_session))
        .route("/sessions/{id}/end", post(end_session))
}

fn respond(session: MeetingSession) -> SessionResponse {
    SessionResponse {
        active_duration_seconds: session.active_duration_seconds(Utc::now()),
        session,
    }
}

// ---------------------------------------------------------------------------
// POST /api/v1/sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub organization_id: String,
    pub team_id: String,
    pub meeting_type: String,
    pub facilitator_id: String,
}

async fn start_session(
    State(state): State<AppState>,
    Json(body): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    if body.organization_id.trim().is_empty()
        || body.team_id.trim().is_empty()
        || body.meeting_type.trim().is_empty()
    {
        return Err(ApiError::bad_request(
            "organization_id, team_id, and meeting_type are required",
        ));
    }

    let session = state
        .store
        .start(
            &body.organization_id,
            &body.team_id,
            &body.meeting_type,
            &body.facilitator_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(respond(session))))
}

// ---------------------------------------------------------------------------
// POST /api/v1/sessions/:id/pause | resume | end
// ---------------------------------------------------------------------------

async fn pause_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.store.pause(&id).await?;
    Ok(Json(respond(session)))
}

async fn resume_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.store.resume(&id).await?;
    Ok(Json(respond(session)))
}

async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.store.end(&id).await?;
    Ok(Json(respond(session)))
}

// ---------------------------------------------------------------------------
// GET /api/v1/sessions/active
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ActiveSessionQuery {
    pub organization_id: String,
    pub team_id: String,
    pub meeting_type: String,
}

async fn get_active_session(
    State(state): State<AppState>,
    Query(query): Query<ActiveSessionQuery>,
) -> Result<Json<Option<SessionResponse>>, ApiError> {
    let session = state
        .store
        .get_active(&query.organization_id, &query.team_id, &query.meeting_type)
        .await?;
    Ok(Json(session.map(respond)))
}
