//! Durable meeting-session accounting: the single source of truth for
//! elapsed/paused durations.
//!
//! At most one session per (organization, team, meeting type) may be active
//! or paused at a time, enforced at `start`. `concluded` is terminal.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use cadence_common::id::{self, prefix};
use cadence_common::session::{MeetingSession, PausedInterval, SessionStatus};

/// Session state-machine failures, mapped onto the REST surface by the
/// routes layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// An active or paused session already exists for this key.
    Conflict,
    /// The session is not in the state the operation requires.
    InvalidState(&'static str),
    /// `end` called on an already-concluded session. Callers treat this as
    /// an idempotent success.
    AlreadyConcluded,
    NotFound,
}

/// Abstraction over the durable session store.
///
/// Backed by a database in production and an in-memory map in tests and
/// single-process deployments.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn start(
        &self,
        organization_id: &str,
        team_id: &str,
        meeting_type: &str,
        facilitator_id: &str,
    ) -> Result<MeetingSession, SessionError>;

    async fn pause(&self, id: &str) -> Result<MeetingSession, SessionError>;

    /// Close the open pause interval and return the session with its
    /// authoritative totals, the reconciliation point for client timers.
    async fn resume(&self, id: &str) -> Result<MeetingSession, SessionError>;

    async fn end(&self, id: &str) -> Result<MeetingSession, SessionError>;

    async fn get_active(
        &self,
        organization_id: &str,
        team_id: &str,
        meeting_type: &str,
    ) -> Result<Option<MeetingSession>, SessionError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, MeetingSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn start(
        &self,
        organization_id: &str,
        team_id: &str,
        meeting_type: &str,
        facilitator_id: &str,
    ) -> Result<MeetingSession, SessionError> {
        let mut sessions = self.sessions.lock();
        let exists = sessions.values().any(|s| {
            s.organization_id == organization_id
                && s.team_id == team_id
                && s.meeting_type == meeting_type
                && s.status != SessionStatus::Concluded
        });
        if exists {
            return Err(SessionError::Conflict);
        }

        let session = MeetingSession {
            id: id::prefixed_ulid(prefix::SESSION),
            organization_id: organization_id.to_string(),
            team_id: team_id.to_string(),
            meeting_type: meeting_type.to_string(),
            facilitator_id: facilitator_id.to_string(),
            status: SessionStatus::Active,
            started_at: Utc::now(),
            paused_intervals: Vec::new(),
            total_paused_seconds: 0,
            ended_at: None,
        };
        sessions.insert(session.id.clone(), session.clone());
        tracing::info!(session_id = %session.id, organization_id, team_id, meeting_type, "session started");
        Ok(session)
    }

    async fn pause(&self, id: &str) -> Result<MeetingSession, SessionError> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        match session.status {
            SessionStatus::Active => {}
            SessionStatus::Paused => return Err(SessionError::InvalidState("active")),
            SessionStatus::Concluded => return Err(SessionError::InvalidState("active")),
        }

        session.paused_intervals.push(PausedInterval {
            start: Utc::now(),
            end: None,
        });
        session.status = SessionStatus::Paused;
        tracing::info!(session_id = %id, "session paused");
        Ok(session.clone())
    }

    async fn resume(&self, id: &str) -> Result<MeetingSession, SessionError> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        if session.status != SessionStatus::Paused {
            return Err(SessionError::InvalidState("paused"));
        }

        let now = Utc::now();
        if let Some(open) = session
            .paused_intervals
            .last_mut()
            .filter(|interval| interval.end.is_none())
        {
            let paused_for = (now - open.start).num_seconds().max(0);
            open.end = Some(now);
            session.total_paused_seconds += paused_for;
        }
        session.status = SessionStatus::Active;
        tracing::info!(
            session_id = %id,
            total_paused_seconds = session.total_paused_seconds,
            "session resumed"
        );
        Ok(session.clone())
    }

    async fn end(&self, id: &str) -> Result<MeetingSession, SessionError> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        if session.status == SessionStatus::Concluded {
            return Err(SessionError::AlreadyConcluded);
        }

        let now = Utc::now();
        if let Some(open) = session
            .paused_intervals
            .last_mut()
            .filter(|interval| interval.end.is_none())
        {
            let paused_for = (now - open.start).num_seconds().max(0);
            open.end = Some(now);
            session.total_paused_seconds += paused_for;
        }
        session.status = SessionStatus::Concluded;
        session.ended_at = Some(now);
        tracing::info!(session_id = %id, "session concluded");
        Ok(session.clone())
    }

    async fn get_active(
        &self,
        organization_id: &str,
        team_id: &str,
        meeting_type: &str,
    ) -> Result<Option<MeetingSession>, SessionError> {
        let sessions = self.sessions.lock();
        Ok(sessions
            .values()
            .find(|s| {
                s.organization_id == organization_id
                    && s.team_id == team_id
                    && s.meeting_type == meeting_type
                    && s.status != SessionStatus::Concluded
            })
            .cloned())
    }
}
