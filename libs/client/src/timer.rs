//! The shared meeting timer and its pause state machine.
//!
//! The leader's `TimerState` is authoritative between session-store
//! reconciliations; followers mirror it by re-deriving their whole state from
//! `TimerSnapshot`s carried on TIMER_PAUSED/TIMER_RESUMED, so duplicated or
//! reordered deliveries are harmless. Every method takes `now` as an argument
//! so tests are deterministic.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use cadence_common::agenda::{classify_pace, Agenda, Pace};
use cadence_common::events::TimerSnapshot;
use cadence_common::session::{SessionResponse, SessionStatus};

/// Local timer state for one meeting.
///
/// While running, active duration is derived from an epoch: `now - epoch -
/// total_paused_seconds`. Reconciling against the session store rebases the
/// epoch so the local figure matches the store's exactly. While paused, the
/// figure is frozen at the value it had when the pause started.
#[derive(Debug, Clone, Default)]
pub struct TimerState {
    started: bool,
    epoch: Option<DateTime<Utc>>,
    is_paused: bool,
    total_paused_seconds: i64,
    /// Active duration frozen at the moment of the last pause.
    frozen_active_seconds: i64,
    current_section: Option<String>,
    /// When the current section started counting; `None` while paused.
    section_started_at: Option<DateTime<Utc>>,
    /// Seconds already spent in each section, excluding the running one's
    /// in-flight time.
    section_cumulative: HashMap<String, i64>,
}

impl TimerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin the meeting clock at `now`.
    pub fn start(&mut self, now: DateTime<Utc>) {
        *self = Self {
            started: true,
            epoch: Some(now),
            ..Self::default()
        };
    }

    pub fn started(&self) -> bool {
        self.started
    }

    /// Advance local accounting by one cadence step. Purely observational:
    /// the derived figures already track `now`, so a tick only reports the
    /// current active duration for display.
    pub fn tick(&self, now: DateTime<Utc>) -> i64 {
        self.active_seconds(now)
    }

    fn active_seconds(&self, now: DateTime<Utc>) -> i64 {
        if self.is_paused || !self.started {
            return self.frozen_active_seconds;
        }
        match self.epoch {
            Some(epoch) => ((now - epoch).num_seconds() - self.total_paused_seconds).max(0),
            None => 0,
        }
    }

    /// Fold the running section's in-flight time into the cumulative map.
    fn flush_section(&mut self, now: DateTime<Utc>) {
        if let (Some(section), Some(started_at)) =
            (self.current_section.as_ref(), self.section_started_at.take())
        {
            let elapsed = (now - started_at).num_seconds().max(0);
            *self.section_cumulative.entry(section.clone()).or_insert(0) += elapsed;
        }
    }

    pub(crate) fn pause(&mut self, now: DateTime<Utc>) {
        if self.is_paused || !self.started {
            return;
        }
        self.frozen_active_seconds = self.active_seconds(now);
        self.flush_section(now);
        self.is_paused = true;
    }

    /// Resume, taking the session store's authoritative figures. This is the
    /// reconciliation point: the epoch is rebased so the locally derived
    /// active duration matches the store's exactly.
    pub(crate) fn resume_with(
        &mut self,
        total_paused_seconds: i64,
        active_duration_seconds: i64,
        now: DateTime<Utc>,
    ) {
        self.started = true;
        self.is_paused = false;
        self.total_paused_seconds = total_paused_seconds;
        self.epoch = Some(now - Duration::seconds(active_duration_seconds + total_paused_seconds));
        if self.current_section.is_some() {
            self.section_started_at = Some(now);
        }
    }

    /// Move to a new agenda section. No-op while paused: section navigation
    /// during a pause would silently burn paused time against the new
    /// section.
    pub(crate) fn change_section(&mut self, section_id: &str, now: DateTime<Utc>) {
        if self.is_paused || !self.started {
            return;
        }
        self.flush_section(now);
        self.current_section = Some(section_id.to_string());
        self.section_started_at = Some(now);
    }

    /// The authoritative broadcast form of this timer, with the running
    /// section's in-flight time folded in.
    pub fn snapshot(&self, now: DateTime<Utc>) -> TimerSnapshot {
        let mut section_cumulative = self.section_cumulative.clone();
        if let (Some(section), Some(started_at)) =
            (self.current_section.as_ref(), self.section_started_at)
        {
            *section_cumulative.entry(section.clone()).or_insert(0) +=
                (now - started_at).num_seconds().max(0);
        }
        TimerSnapshot {
            meeting_start: self.epoch.unwrap_or(now),
            is_paused: self.is_paused,
            total_paused_seconds: self.total_paused_seconds,
            active_duration_seconds: self.active_seconds(now),
            current_section: self.current_section.clone(),
            section_cumulative,
        }
    }

    /// Follower-side application of a TIMER_PAUSED snapshot. Replaces the
    /// whole state, so reapplying the same snapshot is a no-op.
    pub fn apply_paused(&mut self, snapshot: &TimerSnapshot) {
        self.started = true;
        self.is_paused = true;
        self.epoch = Some(snapshot.meeting_start);
        self.total_paused_seconds = snapshot.total_paused_seconds;
        self.frozen_active_seconds = snapshot.active_duration_seconds;
        self.current_section = snapshot.current_section.clone();
        self.section_started_at = None;
        self.section_cumulative = snapshot.section_cumulative.clone();
    }

    /// Follower-side application of a TIMER_RESUMED snapshot.
    pub fn apply_resumed(&mut self, snapshot: &TimerSnapshot, now: DateTime<Utc>) {
        self.started = true;
        self.is_paused = false;
        self.total_paused_seconds = snapshot.total_paused_seconds;
        self.epoch = Some(
            now - Duration::seconds(
                snapshot.active_duration_seconds + snapshot.total_paused_seconds,
            ),
        );
        self.current_section = snapshot.current_section.clone();
        self.section_cumulative = snapshot.section_cumulative.clone();
        self.section_started_at = self.current_section.as_ref().map(|_| now);
    }

    /// Align the timer with a durable session fetched from the hub, used on
    /// join and after a reconnect.
    pub fn sync_from_session(&mut self, response: &SessionResponse, now: DateTime<Utc>) {
        match response.session.status {
            SessionStatus::Active => {
                self.resume_with(
                    response.session.total_paused_seconds,
                    response.active_duration_seconds,
                    now,
                );
            }
            SessionStatus::Paused | SessionStatus::Concluded => {
                self.started = true;
                self.is_paused = true;
                self.total_paused_seconds = response.session.total_paused_seconds;
                self.frozen_active_seconds = response.active_duration_seconds;
                self.section_started_at = None;
            }
        }
    }
}

/// Read-only timer queries, available to every participant.
pub trait TimerView {
    fn is_paused(&self) -> bool;
    fn active_duration_seconds(&self, now: DateTime<Utc>) -> i64;
    fn current_section(&self) -> Option<&str>;
    fn section_elapsed_seconds(&self, now: DateTime<Utc>) -> i64;
    /// Advisory pace of the meeting against the agenda plan through the
    /// current section. UI state only.
    fn pace(&self, agenda: &Agenda, now: DateTime<Utc>) -> Pace;
}

impl TimerView for TimerState {
    fn is_paused(&self) -> bool {
        self.is_paused
    }

    fn active_duration_seconds(&self, now: DateTime<Utc>) -> i64 {
        self.active_seconds(now)
    }

    fn current_section(&self) -> Option<&str> {
        self.current_section.as_deref()
    }

    fn section_elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        let Some(section) = self.current_section.as_ref() else {
            return 0;
        };
        let mut elapsed = self.section_cumulative.get(section).copied().unwrap_or(0);
        if let Some(started_at) = self.section_started_at {
            elapsed += (now - started_at).num_seconds().max(0);
        }
        elapsed
    }

    fn pace(&self, agenda: &Agenda, now: DateTime<Utc>) -> Pace {
        let Some(section) = self.current_section.as_ref() else {
            return Pace::OnTrack;
        };
        match agenda.planned_seconds_through(section) {
            Some(planned) => classify_pace(self.active_seconds(now), planned),
            None => Pace::OnTrack,
        }
    }
}

/// Timer mutations reserved for the room leader. The meeting client hands
/// this wrapper out only while it holds leadership, so follower code has no
/// path to the mutating methods.
pub trait LeaderTimerControl {
    fn pause(&mut self, now: DateTime<Utc>);
    fn resume_with(
        &mut self,
        total_paused_seconds: i64,
        active_duration_seconds: i64,
        now: DateTime<Utc>,
    );
    fn change_section(&mut self, section_id: &str, now: DateTime<Utc>);
}

pub struct LeaderTimer<'a> {
    state: &'a mut TimerState,
}

impl<'a> LeaderTimer<'a> {
    pub(crate) fn new(state: &'a mut TimerState) -> Self {
        Self { state }
    }
}

impl LeaderTimerControl for LeaderTimer<'_> {
    fn pause(&mut self, now: DateTime<Utc>) {
        self.state.pause(now);
    }

    fn resume_with(
        &mut self,
        total_paused_seconds: i64,
        active_duration_seconds: i64,
        now: DateTime<Utc>,
    ) {
        self.state.resume_with(total_paused_seconds, active_duration_seconds, now);
    }

    fn change_section(&mut self, section_id: &str, now: DateTime<Utc>) {
        self.state.change_section(section_id, now);
    }
}
