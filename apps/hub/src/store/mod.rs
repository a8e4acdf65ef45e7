pub mod sessions;

pub use sessions::{MemorySessionStore, SessionError, SessionStore};
