pub mod agenda;
pub mod events;
pub mod id;
pub mod protocol;
pub mod room;
pub mod session;

pub use events::{DomainEvent, DomainEventKind, TimerSnapshot};
pub use id::PrefixedId;
pub use room::RoomKey;
pub use session::{MeetingSession, SessionResponse, SessionStatus};
