//! Presence and leadership: join/leave/reconnect and the disconnect sweeper.
//!
//! The join decision is resolved atomically under the room's lock, so the
//! membership snapshot it is based on is consistent by construction — there is
//! no client-side wait-and-recheck. At most one leader exists per room, and a
//! leader's departure leaves the seat vacant: no automatic promotion, the next
//! leader is whoever re-joins with `wants_leadership` while the seat is empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use cadence_common::protocol::{ParticipantInfo, RatingsSummary};
use cadence_common::RoomKey;

use super::rooms::{Participant, RoomRegistry};

/// Result of a join, captured while the room lock was held.
pub struct JoinOutcome {
    pub is_leader: bool,
    pub leader_id: Option<String>,
    pub participants: Vec<ParticipantInfo>,
    /// True when the participant id was already a member (reconnect): the
    /// connection id was replaced and membership/leadership survived.
    pub reconnected: bool,
    pub notes: HashMap<String, String>,
    pub ratings: RatingsSummary,
}

/// Result of a leave.
pub struct LeaveOutcome {
    pub leadership_vacated: bool,
    pub room_destroyed: bool,
    pub participants: Vec<ParticipantInfo>,
    pub leader_id: Option<String>,
}

/// One room changed by a sweep pass.
pub struct SweepOutcome {
    pub room_key: String,
    pub expired: Vec<String>,
    pub leadership_vacated: bool,
    pub room_destroyed: bool,
    pub participants: Vec<ParticipantInfo>,
    pub leader_id: Option<String>,
}

/// Join/leave/sweep operations over the room registry.
#[derive(Clone)]
pub struct PresenceManager {
    registry: Arc<RoomRegistry>,
}

impl PresenceManager {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Join a room, resolving leader/follower status deterministically:
    /// - first joiner leads regardless of `wants_leadership`;
    /// - an occupied room grants leadership only to a joiner who wants it
    ///   while the seat is vacant;
    /// - a returning participant id is a reconnect: the connection id is
    ///   replaced, membership and any held leadership survive.
    pub fn join(
        &self,
        key: &RoomKey,
        participant_id: &str,
        display_name: &str,
        connection_id: &str,
        wants_leadership: bool,
    ) -> JoinOutcome {
        self.registry.with_room_or_create(key, |room| {
            let reconnected = match room.participants.get_mut(participant_id) {
                Some(existing) => {
                    existing.connection_id = connection_id.to_string();
                    existing.display_name = display_name.to_string();
                    existing.disconnected_at = None;
                    true
                }
                None => {
                    room.participants.insert(
                        participant_id.to_string(),
                        Participant {
                            id: participant_id.to_string(),
                            connection_id: connection_id.to_string(),
                            display_name: display_name.to_string(),
                            joined_at: Utc::now(),
                            disconnected_at: None,
                        },
                    );
                    false
                }
            };

            let first_in = room.participants.len() == 1;
            if first_in {
                // First-in always leads.
                room.leader_id = Some(participant_id.to_string());
            } else if wants_leadership && room.leader_id.is_none() {
                // Leader seat vacated without a successor — claim it.
                room.leader_id = Some(participant_id.to_string());
            }

            let is_leader = room.leader_id.as_deref() == Some(participant_id);
            tracing::info!(
                room = %room.key,
                participant_id,
                is_leader,
                reconnected,
                participants = room.participants.len(),
                "participant joined"
            );

            JoinOutcome {
                is_leader,
                leader_id: room.leader_id.clone(),
                participants: room.participants_snapshot(),
                reconnected,
                notes: room.notes.clone(),
                ratings: room.ratings_summary(),
            }
        })
    }

    /// Remove a participant. A departing leader vacates the seat; an emptied
    /// room is destroyed immediately.
    pub fn leave(&self, room_key: &str, participant_id: &str) -> Option<LeaveOutcome> {
        let outcome = self.registry.with_room(room_key, |room| {
            if room.participants.remove(participant_id).is_none() {
                return None;
            }
            let leadership_vacated = room.leader_id.as_deref() == Some(participant_id);
            if leadership_vacated {
                room.leader_id = None;
            }
            Some(LeaveOutcome {
                leadership_vacated,
                room_destroyed: room.participants.is_empty(),
                participants: room.participants_snapshot(),
                leader_id: room.leader_id.clone(),
            })
        })??;

        if outcome.room_destroyed {
            self.registry.remove_if_empty(room_key);
            tracing::info!(room = %room_key, "room destroyed (no participants)");
        } else {
            tracing::info!(
                room = %room_key,
                participant_id,
                leadership_vacated = outcome.leadership_vacated,
                "participant left"
            );
        }
        Some(outcome)
    }

    /// Mark a participant's transport as dropped. Membership survives until
    /// the grace period expires; a reconnect clears the marker via `join`.
    pub fn mark_disconnected(&self, room_key: &str, participant_id: &str, connection_id: &str) {
        self.registry.with_room(room_key, |room| {
            if let Some(p) = room.participants.get_mut(participant_id) {
                // A newer connection may have already replaced this one.
                if p.connection_id == connection_id {
                    p.disconnected_at = Some(Instant::now());
                }
            }
        });
    }

    /// Expire participants whose disconnect grace has lapsed. Returns the
    /// rooms that changed so the caller can broadcast presence updates.
    pub fn sweep(&self, grace: Duration) -> Vec<SweepOutcome> {
        let now = Instant::now();
        let mut outcomes = Vec::new();

        for room_key in self.registry.room_keys() {
            let changed = self.registry.with_room(&room_key, |room| {
                let expired: Vec<String> = room
                    .participants
                    .values()
                    .filter(|p| {
                        p.disconnected_at
                            .is_some_and(|at| now.duration_since(at) >= grace)
                    })
                    .map(|p| p.id.clone())
                    .collect();
                if expired.is_empty() {
                    return None;
                }

                let mut leadership_vacated = false;
                for id in &expired {
                    room.participants.remove(id);
                    if room.leader_id.as_deref() == Some(id) {
                        room.leader_id = None;
                        leadership_vacated = true;
                    }
                }

                Some(SweepOutcome {
                    room_key: room_key.clone(),
                    expired,
                    leadership_vacated,
                    room_destroyed: room.participants.is_empty(),
                    participants: room.participants_snapshot(),
                    leader_id: room.leader_id.clone(),
                })
            });

            if let Some(Some(outcome)) = changed {
                if outcome.room_destroyed {
                    self.registry.remove_if_empty(&room_key);
                }
                tracing::info!(
                    room = %room_key,
                    expired = outcome.expired.len(),
                    room_destroyed = outcome.room_destroyed,
                    "swept disconnected participants"
                );
                outcomes.push(outcome);
            }
        }

        outcomes
    }
}
