use thiserror::Error;

/// Errors surfaced by the meeting client, its transport, and the session
/// REST client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport exhausted its reconnection budget; the connection and
    /// any joined room are gone for good.
    #[error("connection to the hub was lost")]
    ConnectionLost,

    /// The transport is between connections and the send policy rejects
    /// writes while reconnecting.
    #[error("transport is reconnecting")]
    Reconnecting,

    /// A second join was attempted on the same connection lifetime.
    #[error("already joined a room on this connection")]
    AlreadyJoined,

    /// An operation that requires room membership was called before joining.
    #[error("not joined to a room")]
    NotJoined,

    /// A leader-only operation was called by a follower.
    #[error("operation requires room leadership")]
    NotLeader,

    /// An active or paused session already exists for this room key.
    #[error("an active session already exists for this room key")]
    SessionConflict,

    /// The session is not in the state the operation requires.
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// No durable session exists where one was expected.
    #[error("session not found")]
    SessionNotFound,

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The hub sent something the client could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),
}
