//! Room keys: the routing identity of one concurrently-running meeting.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one running meeting of a given type for a given team.
///
/// The canonical string form (`"{org}-{team}-{type}"`) is used as the hub's
/// routing key. It is derived-only: organization and team IDs are UUIDs that
/// themselves contain dashes, so the string is never parsed back — the wire
/// join payload always carries the structured triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomKey {
    pub organization_id: String,
    pub team_id: String,
    pub meeting_type: String,
}

impl RoomKey {
    pub fn new(
        organization_id: impl Into<String>,
        team_id: impl Into<String>,
        meeting_type: impl Into<String>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            team_id: team_id.into(),
            meeting_type: meeting_type.into(),
        }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.organization_id, self.team_id, self.meeting_type
        )
    }
}
