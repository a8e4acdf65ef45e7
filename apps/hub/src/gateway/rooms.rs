//! Room registry: the live set of participants per running meeting.
//!
//! Rooms are ephemeral. They are created on first join, mutated only under
//! their own lock, and destroyed the moment the participant set empties —
//! empty rooms are never persisted.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use cadence_common::protocol::{ParticipantInfo, RatingEntry, RatingsSummary};
use cadence_common::RoomKey;

/// A connected (or grace-period disconnected) meeting participant.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Stable per user per meeting; survives reconnects.
    pub id: String,
    /// Volatile; replaced on every reconnect.
    pub connection_id: String,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
    /// Set when the transport drops; cleared on reconnect. The sweeper
    /// removes the participant once the grace period expires.
    pub disconnected_at: Option<Instant>,
}

/// One running meeting's live state. Owned by the registry; all access goes
/// through the per-room mutex.
pub struct Room {
    pub key: RoomKey,
    pub participants: HashMap<String, Participant>,
    pub leader_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Latest section-notes text per section, replayed to late joiners.
    pub notes: HashMap<String, String>,
    /// Submitted meeting ratings, keyed by participant id.
    pub ratings: HashMap<String, RatingEntry>,
}

impl Room {
    fn new(key: RoomKey) -> Self {
        Self {
            key,
            participants: HashMap::new(),
            leader_id: None,
            created_at: Utc::now(),
            notes: HashMap::new(),
            ratings: HashMap::new(),
        }
    }

    /// Presence snapshot, sorted by join time for stable output.
    pub fn participants_snapshot(&self) -> Vec<ParticipantInfo> {
        let mut list: Vec<ParticipantInfo> = self
            .participants
            .values()
            .map(|p| ParticipantInfo {
                id: p.id.clone(),
                display_name: p.display_name.clone(),
                joined_at: p.joined_at,
            })
            .collect();
        list.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));
        list
    }

    /// Running aggregate over submitted ratings.
    pub fn ratings_summary(&self) -> RatingsSummary {
        let mut ratings: Vec<RatingEntry> = self.ratings.values().cloned().collect();
        ratings.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        let total_ratings = ratings.len();
        let average_rating = if total_ratings > 0 {
            ratings.iter().map(|r| r.rating).sum::<f32>() / total_ratings as f32
        } else {
            0.0
        };
        RatingsSummary {
            total_participants: self.participants.len(),
            total_ratings,
            average_rating,
            ratings,
        }
    }
}

/// Summary of a live room for the "does a meeting already exist" query.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub key: RoomKey,
    pub leader_id: Option<String>,
    pub participants: Vec<ParticipantInfo>,
    pub created_at: DateTime<Utc>,
}

/// Shared registry of all live rooms.
///
/// Uses `DashMap` for shard-level concurrency and `parking_lot::Mutex` per
/// room, so unrelated rooms never contend on a global lock.
pub struct RoomRegistry {
    rooms: DashMap<String, Mutex<Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Run `f` under the room's lock, creating the room first if needed.
    pub fn with_room_or_create<T>(&self, key: &RoomKey, f: impl FnOnce(&mut Room) -> T) -> T {
        let entry = self
            .rooms
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(Room::new(key.clone())));
        let mut room = entry.lock();
        f(&mut room)
    }

    /// Run `f` under the room's lock if the room exists.
    pub fn with_room<T>(&self, room_key: &str, f: impl FnOnce(&mut Room) -> T) -> Option<T> {
        let entry = self.rooms.get(room_key)?;
        let mut room = entry.lock();
        Some(f(&mut room))
    }

    /// Delete the room if it has no participants left. Returns whether it was
    /// removed.
    pub fn remove_if_empty(&self, room_key: &str) -> bool {
        self.rooms
            .remove_if(room_key, |_, room| room.lock().participants.is_empty())
            .is_some()
    }

    pub fn snapshot(&self, room_key: &str) -> Option<RoomSnapshot> {
        let entry = self.rooms.get(room_key)?;
        let room = entry.lock();
        Some(RoomSnapshot {
            key: room.key.clone(),
            leader_id: room.leader_id.clone(),
            participants: room.participants_snapshot(),
            created_at: room.created_at,
        })
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Room keys currently live, for the sweeper's iteration.
    pub fn room_keys(&self) -> Vec<String> {
        self.rooms.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
