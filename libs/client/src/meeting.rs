//! The meeting client: join lifecycle, dispatch application, leader
//! operations, and reconnect resync.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use cadence_common::events::{DomainEvent, DomainEventKind, EventName};
use cadence_common::protocol::{
    ClientMessage, ErrorPayload, JoinPayload, JoinedPayload, ParticipantInfo,
    PresenceChangedPayload, RatingsSummary, OP_DISPATCH,
};
use cadence_common::room::RoomKey;
use cadence_common::session::{MeetingSession, SessionStatus};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::sessions::{ActiveRoom, SessionClient};
use crate::timer::{LeaderTimer, LeaderTimerControl, TimerState, TimerView};
use crate::transport::{Transport, TransportEvent};

/// State changes surfaced to the embedding application.
#[derive(Debug)]
pub enum MeetingEvent {
    PresenceChanged {
        participants: Vec<ParticipantInfo>,
        leader_id: Option<String>,
    },
    VoteCast {
        issue_id: String,
        delta: i32,
    },
    IssueUpdated {
        payload: Value,
    },
    TodoUpdated {
        action: String,
        payload: Value,
    },
    RatingsUpdated(RatingsSummary),
    NotesSynced {
        section_id: String,
        text: String,
    },
    SectionChanged {
        section_id: String,
    },
    /// The leader opened the durable session while we were already in the
    /// room; the local timer is now synced to it.
    SessionStarted,
    TimerPaused,
    TimerResumed,
    MeetingEnded,
    ServerError {
        code: String,
        message: String,
    },
    /// The connection dropped. Local ticking is invalid until
    /// [`MeetingClient::resume_from_reconnect`] completes.
    Disconnected,
    /// A fresh connection is up after a drop. The room must be re-joined.
    Reconnected,
}

/// Local mirror of the room, fed only by inbound dispatches and join
/// payloads. Kept free of I/O so dispatch application is unit-testable.
#[derive(Debug)]
pub(crate) struct RoomView {
    participant_id: String,
    joined: bool,
    is_leader: bool,
    leader_id: Option<String>,
    participants: Vec<ParticipantInfo>,
    notes: HashMap<String, String>,
    ratings: RatingsSummary,
    session: Option<MeetingSession>,
    timer: TimerState,
}

impl RoomView {
    fn new(participant_id: String) -> Self {
        Self {
            participant_id,
            joined: false,
            is_leader: false,
            leader_id: None,
            participants: Vec::new(),
            notes: HashMap::new(),
            ratings: RatingsSummary::default(),
            session: None,
            timer: TimerState::new(),
        }
    }

    fn apply_joined(&mut self, payload: JoinedPayload, now: DateTime<Utc>) {
        self.joined = true;
        self.is_leader = payload.is_leader;
        self.leader_id = payload.leader_id;
        self.participants = payload.participants;
        self.notes = payload.notes;
        self.ratings = payload.ratings;
        if let Some(response) = payload.session {
            self.timer.sync_from_session(&response, now);
            self.session = Some(response.session);
        }
    }

    /// The connection (and with it the room membership) is gone; freeze the
    /// timer so stale local ticking cannot drift from the room.
    fn connection_lost(&mut self, now: DateTime<Utc>) {
        self.joined = false;
        self.is_leader = false;
        self.timer.pause(now);
    }

    /// Apply one inbound dispatch. Returns `None` for self-echoes and
    /// frames that change nothing the caller needs to hear about.
    fn apply_dispatch(
        &mut self,
        event_name: &str,
        data: Value,
        now: DateTime<Utc>,
    ) -> Option<MeetingEvent> {
        if data.get("originator_id").and_then(Value::as_str) == Some(self.participant_id.as_str())
        {
            return None;
        }

        match event_name {
            EventName::PRESENCE_CHANGED => {
                let payload: PresenceChangedPayload = serde_json::from_value(data).ok()?;
                self.participants = payload.participants.clone();
                self.leader_id = payload.leader_id.clone();
                self.is_leader = self.leader_id.as_deref() == Some(&self.participant_id);
                Some(MeetingEvent::PresenceChanged {
                    participants: payload.participants,
                    leader_id: payload.leader_id,
                })
            }
            EventName::CURRENT_RATINGS => {
                let summary: RatingsSummary = serde_json::from_value(data).ok()?;
                self.ratings = summary.clone();
                Some(MeetingEvent::RatingsUpdated(summary))
            }
            EventName::ERROR => {
                let payload: ErrorPayload = serde_json::from_value(data).ok()?;
                Some(MeetingEvent::ServerError {
                    code: payload.code,
                    message: payload.message,
                })
            }
            _ => {
                let event: DomainEvent = serde_json::from_value(data).ok()?;
                self.apply_event(event.kind, now)
            }
        }
    }

    fn apply_event(&mut self, kind: DomainEventKind, now: DateTime<Utc>) -> Option<MeetingEvent> {
        match kind {
            DomainEventKind::Vote { issue_id, delta } => {
                Some(MeetingEvent::VoteCast { issue_id, delta })
            }
            DomainEventKind::IssueUpdate { payload } => {
                Some(MeetingEvent::IssueUpdated { payload })
            }
            DomainEventKind::TodoUpdate { action, payload } => {
                Some(MeetingEvent::TodoUpdated { action, payload })
            }
            // The aggregate arrives separately as CURRENT_RATINGS.
            DomainEventKind::Rating { .. } => None,
            DomainEventKind::NotesUpdate { section_id, text } => {
                self.notes.insert(section_id.clone(), text.clone());
                Some(MeetingEvent::NotesSynced { section_id, text })
            }
            DomainEventKind::SectionChange { section_id } => {
                self.timer.change_section(&section_id, now);
                Some(MeetingEvent::SectionChanged { section_id })
            }
            DomainEventKind::SessionStarted { session } => {
                self.timer.sync_from_session(&session, now);
                self.session = Some(session.session);
                Some(MeetingEvent::SessionStarted)
            }
            DomainEventKind::TimerPaused { snapshot } => {
                self.timer.apply_paused(&snapshot);
                if let Some(session) = self.session.as_mut() {
                    session.status = SessionStatus::Paused;
                }
                Some(MeetingEvent::TimerPaused)
            }
            DomainEventKind::TimerResumed { snapshot } => {
                self.timer.apply_resumed(&snapshot, now);
                if let Some(session) = self.session.as_mut() {
                    session.status = SessionStatus::Active;
                }
                Some(MeetingEvent::TimerResumed)
            }
            DomainEventKind::MeetingEnded => {
                self.timer.pause(now);
                if let Some(session) = self.session.as_mut() {
                    session.status = SessionStatus::Concluded;
                }
                Some(MeetingEvent::MeetingEnded)
            }
        }
    }
}

/// One participant's connection to a meeting room.
pub struct MeetingClient {
    config: ClientConfig,
    sessions: SessionClient,
    transport: Transport,
    room: RoomKey,
    display_name: String,
    view: RoomView,
}

impl MeetingClient {
    /// Connect the transport and wait for the first connection. Does not
    /// join a room yet; call [`MeetingClient::active_room`] first if the
    /// caller wants to base `wants_leadership` on who is already there.
    pub async fn connect(
        config: ClientConfig,
        room: RoomKey,
        participant_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let sessions = SessionClient::new(config.api_url());
        let mut transport = Transport::connect(&config);
        match transport.next_event().await {
            Some(TransportEvent::Connected) => {}
            _ => return Err(ClientError::ConnectionLost),
        }
        Ok(Self {
            config,
            sessions,
            transport,
            room,
            display_name: display_name.into(),
            view: RoomView::new(participant_id.into()),
        })
    }

    pub fn participant_id(&self) -> &str {
        &self.view.participant_id
    }

    pub fn room(&self) -> &RoomKey {
        &self.room
    }

    pub fn is_joined(&self) -> bool {
        self.view.joined
    }

    pub fn is_leader(&self) -> bool {
        self.view.is_leader
    }

    pub fn leader_id(&self) -> Option<&str> {
        self.view.leader_id.as_deref()
    }

    pub fn participants(&self) -> &[ParticipantInfo] {
        &self.view.participants
    }

    pub fn notes(&self) -> &HashMap<String, String> {
        &self.view.notes
    }

    pub fn ratings(&self) -> &RatingsSummary {
        &self.view.ratings
    }

    pub fn session(&self) -> Option<&MeetingSession> {
        self.view.session.as_ref()
    }

    /// Read-only timer access; leader mutations go through the meeting
    /// operations below.
    pub fn timer(&self) -> &impl TimerView {
        &self.view.timer
    }

    pub fn sessions(&self) -> &SessionClient {
        &self.sessions
    }

    /// Who is in the room right now, if anyone. Useful before joining to
    /// decide whether to request leadership.
    pub async fn active_room(&self) -> Result<Option<ActiveRoom>, ClientError> {
        self.sessions.active_room(&self.room).await
    }

    /// Join the room. One join per connection lifetime: a second call
    /// without an intervening leave or drop fails with `AlreadyJoined`.
    pub async fn join(&mut self, wants_leadership: bool) -> Result<bool, ClientError> {
        if self.view.joined {
            return Err(ClientError::AlreadyJoined);
        }
        if self.transport.is_reconnecting() {
            return Err(ClientError::Reconnecting);
        }
        self.transport.send(ClientMessage::join(&JoinPayload {
            room: self.room.clone(),
            participant_id: self.view.participant_id.clone(),
            display_name: self.display_name.clone(),
            wants_leadership,
        }))?;

        loop {
            match self.transport.next_event().await {
                Some(TransportEvent::Message(message)) if message.op == OP_DISPATCH => {
                    match message.t.as_deref() {
                        Some(EventName::JOINED) => {
                            let payload: JoinedPayload = serde_json::from_value(message.d)
                                .map_err(|err| {
                                    ClientError::Protocol(format!("bad JOINED payload: {err}"))
                                })?;
                            self.transport.start_heartbeats(Duration::from_millis(
                                payload.heartbeat_interval_ms,
                            ));
                            self.view.apply_joined(payload, Utc::now());
                            return Ok(self.view.is_leader);
                        }
                        Some(EventName::ERROR) => {
                            let payload: ErrorPayload =
                                serde_json::from_value(message.d).unwrap_or(ErrorPayload {
                                    code: "UNKNOWN".into(),
                                    message: String::new(),
                                });
                            return Err(ClientError::Protocol(format!(
                                "join rejected: {} {}",
                                payload.code, payload.message
                            )));
                        }
                        _ => continue,
                    }
                }
                Some(TransportEvent::Message(_)) => continue,
                Some(TransportEvent::Disconnected) => {
                    self.view.connection_lost(Utc::now());
                    return Err(ClientError::ConnectionLost);
                }
                Some(TransportEvent::Connected) => continue,
                Some(TransportEvent::Gone) | None => return Err(ClientError::ConnectionLost),
            }
        }
    }

    /// Leave the room explicitly. The connection stays up and can join
    /// again.
    pub fn leave(&mut self) -> Result<(), ClientError> {
        if !self.view.joined {
            return Err(ClientError::NotJoined);
        }
        self.transport.send(ClientMessage::leave())?;
        self.view.joined = false;
        self.view.is_leader = false;
        Ok(())
    }

    /// Wait for the next meeting event, applying it to local state first.
    pub async fn next_event(&mut self) -> Result<MeetingEvent, ClientError> {
        loop {
            match self.transport.next_event().await {
                Some(TransportEvent::Message(message)) if message.op == OP_DISPATCH => {
                    let Some(event_name) = message.t else { continue };
                    if let Some(event) =
                        self.view.apply_dispatch(&event_name, message.d, Utc::now())
                    {
                        return Ok(event);
                    }
                }
                Some(TransportEvent::Message(_)) => continue,
                Some(TransportEvent::Disconnected) => {
                    self.view.connection_lost(Utc::now());
                    return Ok(MeetingEvent::Disconnected);
                }
                Some(TransportEvent::Connected) => return Ok(MeetingEvent::Reconnected),
                Some(TransportEvent::Gone) | None => return Err(ClientError::ConnectionLost),
            }
        }
    }

    /// Full resync after [`MeetingEvent::Reconnected`]: re-fetch the durable
    /// session, re-join the room (a new connection lifetime means a fresh
    /// join), and reconcile the timer before local ticking resumes.
    pub async fn resume_from_reconnect(
        &mut self,
        wants_leadership: bool,
    ) -> Result<bool, ClientError> {
        if self.view.joined {
            return Err(ClientError::AlreadyJoined);
        }
        let is_leader = self.join(wants_leadership).await?;
        // The JOINED payload carries the session for rooms that have one;
        // fall back to an explicit fetch in case it was started while we
        // were away and the hub had already dropped the room.
        if self.view.session.is_none() {
            if let Some(response) = self.sessions.get_active(&self.room).await? {
                self.view.timer.sync_from_session(&response, Utc::now());
                self.view.session = Some(response.session);
            }
        }
        Ok(is_leader)
    }

    // -- Publishing ---------------------------------------------------------

    fn publish(&self, kind: DomainEventKind) -> Result<(), ClientError> {
        if !self.view.joined {
            return Err(ClientError::NotJoined);
        }
        self.transport.send(ClientMessage::publish(&kind))
    }

    pub fn cast_vote(&self, issue_id: impl Into<String>, delta: i32) -> Result<(), ClientError> {
        self.publish(DomainEventKind::Vote {
            issue_id: issue_id.into(),
            delta,
        })
    }

    pub fn update_issue(&self, payload: Value) -> Result<(), ClientError> {
        self.publish(DomainEventKind::IssueUpdate { payload })
    }

    pub fn update_todo(
        &self,
        action: impl Into<String>,
        payload: Value,
    ) -> Result<(), ClientError> {
        self.publish(DomainEventKind::TodoUpdate {
            action: action.into(),
            payload,
        })
    }

    pub fn submit_rating(&self, rating: f32) -> Result<(), ClientError> {
        self.publish(DomainEventKind::Rating {
            participant_id: self.view.participant_id.clone(),
            rating,
        })
    }

    pub fn sync_notes(
        &mut self,
        section_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), ClientError> {
        let section_id = section_id.into();
        let text = text.into();
        self.publish(DomainEventKind::NotesUpdate {
            section_id: section_id.clone(),
            text: text.clone(),
        })?;
        self.view.notes.insert(section_id, text);
        Ok(())
    }

    // -- Leader operations --------------------------------------------------

    fn require_leadership(&self) -> Result<(), ClientError> {
        if !self.view.joined {
            return Err(ClientError::NotJoined);
        }
        if !self.view.is_leader {
            return Err(ClientError::NotLeader);
        }
        Ok(())
    }

    fn session_id(&self) -> Result<String, ClientError> {
        self.view
            .session
            .as_ref()
            .map(|session| session.id.clone())
            .ok_or(ClientError::SessionNotFound)
    }

    /// Start the durable session for this room and the local timer with it.
    /// Members already in the room hear about it via SESSION_STARTED; later
    /// joiners get the session in their JOINED payload instead.
    pub async fn start_session(&mut self) -> Result<(), ClientError> {
        self.require_leadership()?;
        let response = self
            .sessions
            .start(&self.room, &self.view.participant_id)
            .await?;
        let now = Utc::now();
        self.view.timer.start(now);
        self.view.timer.sync_from_session(&response, now);
        self.view.session = Some(response.session.clone());
        self.publish(DomainEventKind::SessionStarted { session: response })
    }

    /// Pause the meeting: session store first, then the local timer, then
    /// broadcast the authoritative snapshot.
    pub async fn pause_meeting(&mut self) -> Result<(), ClientError> {
        self.require_leadership()?;
        let id = self.session_id()?;
        let response = self.sessions.pause(&id).await?;
        let now = Utc::now();
        LeaderTimer::new(&mut self.view.timer).pause(now);
        self.view.timer.sync_from_session(&response, now);
        let snapshot = self.view.timer.snapshot(now);
        self.view.session = Some(response.session);
        self.publish(DomainEventKind::TimerPaused { snapshot })
    }

    /// Resume the meeting, reconciling the timer against the store's
    /// authoritative pause accounting.
    pub async fn resume_meeting(&mut self) -> Result<(), ClientError> {
        self.require_leadership()?;
        let id = self.session_id()?;
        let response = self.sessions.resume(&id).await?;
        let now = Utc::now();
        LeaderTimer::new(&mut self.view.timer).resume_with(
            response.session.total_paused_seconds,
            response.active_duration_seconds,
            now,
        );
        let snapshot = self.view.timer.snapshot(now);
        self.view.session = Some(response.session);
        self.publish(DomainEventKind::TimerResumed { snapshot })
    }

    /// Move the room to a new agenda section. No-op while paused.
    pub fn change_section(&mut self, section_id: impl Into<String>) -> Result<(), ClientError> {
        self.require_leadership()?;
        if self.view.timer.is_paused() {
            return Ok(());
        }
        let section_id = section_id.into();
        LeaderTimer::new(&mut self.view.timer).change_section(&section_id, Utc::now());
        self.publish(DomainEventKind::SectionChange { section_id })
    }

    /// Conclude the meeting. Ending twice is success: the room hears one
    /// MEETING_ENDED either way.
    pub async fn end_meeting(&mut self) -> Result<(), ClientError> {
        self.require_leadership()?;
        let id = self.session_id()?;
        let ended = self.sessions.end(&id).await?;
        let now = Utc::now();
        LeaderTimer::new(&mut self.view.timer).pause(now);
        if let Some(response) = ended {
            self.view.session = Some(response.session);
        } else if let Some(session) = self.view.session.as_mut() {
            session.status = SessionStatus::Concluded;
        }
        self.publish(DomainEventKind::MeetingEnded)
    }

    /// Advisory pace against the configured agenda.
    pub fn pace(&self) -> cadence_common::agenda::Pace {
        self.view.timer.pace(&self.config.agenda, Utc::now())
    }

    /// Current active duration as the local timer sees it.
    pub fn active_duration_seconds(&self) -> i64 {
        self.view.timer.active_duration_seconds(Utc::now())
    }
}
