//! Domain events fanned out to room members.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::SessionResponse;

/// An event published into a room and delivered to every member except the
/// originator. Payloads beyond routing needs are opaque — the hub does not
/// interpret issue or todo contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// `None` for server-originated events (presence changes, sweeps), which
    /// are delivered to every room member.
    pub originator_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: DomainEventKind,
}

/// The type-specific payload of a [`DomainEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEventKind {
    Vote {
        issue_id: String,
        delta: i32,
    },
    IssueUpdate {
        payload: Value,
    },
    TodoUpdate {
        action: String,
        payload: Value,
    },
    Rating {
        participant_id: String,
        rating: f32,
    },
    SectionChange {
        section_id: String,
    },
    NotesUpdate {
        section_id: String,
        text: String,
    },
    /// The leader opened the durable session; carries the full record so
    /// members who joined before the start can pick up the timer.
    SessionStarted {
        session: SessionResponse,
    },
    TimerPaused {
        snapshot: TimerSnapshot,
    },
    TimerResumed {
        snapshot: TimerSnapshot,
    },
    MeetingEnded,
}

impl DomainEventKind {
    /// The dispatch event name used in the wire envelope's `t` field.
    pub fn event_name(&self) -> &'static str {
        match self {
            DomainEventKind::Vote { .. } => EventName::VOTE,
            DomainEventKind::IssueUpdate { .. } => EventName::ISSUE_UPDATE,
            DomainEventKind::TodoUpdate { .. } => EventName::TODO_UPDATE,
            DomainEventKind::Rating { .. } => EventName::RATING_SUBMIT,
            DomainEventKind::SectionChange { .. } => EventName::SECTION_CHANGE,
            DomainEventKind::NotesUpdate { .. } => EventName::NOTES_SYNC,
            DomainEventKind::SessionStarted { .. } => EventName::SESSION_STARTED,
            DomainEventKind::TimerPaused { .. } => EventName::TIMER_PAUSED,
            DomainEventKind::TimerResumed { .. } => EventName::TIMER_RESUMED,
            DomainEventKind::MeetingEnded => EventName::MEETING_ENDED,
        }
    }

    /// Whether only the room's current leader may publish this event.
    pub fn leader_only(&self) -> bool {
        matches!(
            self,
            DomainEventKind::SessionStarted { .. }
                | DomainEventKind::SectionChange { .. }
                | DomainEventKind::TimerPaused { .. }
                | DomainEventKind::TimerResumed { .. }
                | DomainEventKind::MeetingEnded
        )
    }
}

/// Authoritative timer state carried by `TimerPaused`/`TimerResumed`.
///
/// Followers re-derive their whole local timer from this snapshot rather than
/// applying a delta, so a duplicated or reordered delivery is harmless —
/// applying it twice yields the same state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub meeting_start: DateTime<Utc>,
    pub is_paused: bool,
    pub total_paused_seconds: i64,
    pub active_duration_seconds: i64,
    pub current_section: Option<String>,
    #[serde(default)]
    pub section_cumulative: HashMap<String, i64>,
}

/// Event names dispatched to clients.
pub struct EventName;

impl EventName {
    pub const JOINED: &'static str = "JOINED";
    pub const PRESENCE_CHANGED: &'static str = "PRESENCE_CHANGED";
    pub const VOTE: &'static str = "VOTE";
    pub const ISSUE_UPDATE: &'static str = "ISSUE_UPDATE";
    pub const TODO_UPDATE: &'static str = "TODO_UPDATE";
    pub const RATING_SUBMIT: &'static str = "RATING_SUBMIT";
    pub const CURRENT_RATINGS: &'static str = "CURRENT_RATINGS";
    pub const NOTES_SYNC: &'static str = "NOTES_SYNC";
    pub const SECTION_CHANGE: &'static str = "SECTION_CHANGE";
    pub const SESSION_STARTED: &'static str = "SESSION_STARTED";
    pub const TIMER_PAUSED: &'static str = "TIMER_PAUSED";
    pub const TIMER_RESUMED: &'static str = "TIMER_RESUMED";
    pub const MEETING_ENDED: &'static str = "MEETING_ENDED";
    pub const ERROR: &'static str = "ERROR";
}
