use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = cadence_common::id::prefixed_ulid("prt");
/// assert!(id.starts_with("prt_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Marker trait for types that represent a prefixed ID.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate() -> String {
        prefixed_ulid(Self::PREFIX)
    }
}

/// Well-known ID prefixes.
pub mod prefix {
    /// A participant in a meeting room (stable per user per meeting).
    pub const PARTICIPANT: &str = "prt";
    /// A durable meeting session record.
    pub const SESSION: &str = "ses";
    /// A single WebSocket connection (replaced on reconnect).
    pub const CONNECTION: &str = "con";
}
