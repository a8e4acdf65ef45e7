//! The durable meeting-session record and its duration accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a durable session. `Concluded` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Concluded,
}

/// One pause interval. `end` is `None` while the pause is still open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PausedInterval {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

/// The single source of truth for a meeting's elapsed/paused durations.
///
/// Keyed by (organization, team, meeting type); at most one session per key
/// may be `Active` or `Paused` at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingSession {
    pub id: String,
    pub organization_id: String,
    pub team_id: String,
    pub meeting_type: String,
    pub facilitator_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub paused_intervals: Vec<PausedInterval>,
    pub total_paused_seconds: i64,
    pub ended_at: Option<DateTime<Utc>>,
}

impl MeetingSession {
    /// Wall-clock seconds the meeting has been running, excluding pauses.
    ///
    /// While paused, the open interval counts up to `now`, so the figure
    /// stops advancing the moment the pause starts.
    pub fn active_duration_seconds(&self, now: DateTime<Utc>) -> i64 {
        let end = self.ended_at.unwrap_or(now);
        let mut paused = self.total_paused_seconds;
        if let Some(open) = self
            .paused_intervals
            .last()
            .filter(|interval| interval.end.is_none())
        {
            paused += (now - open.start).num_seconds().max(0);
        }
        ((end - self.started_at).num_seconds() - paused).max(0)
    }
}

/// Session REST response shape: the record plus its computed active duration,
/// evaluated server-side so client clocks never drift from the hub's account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session: MeetingSession,
    pub active_duration_seconds: i64,
}
