//! Identifier types for conversations, messages, and streaming sessions.
//!
//! Thread IDs travel to the backend and are therefore UUIDs rendered as
//! strings. Message and session IDs never leave the process and are plain
//! counters handed out by an [`IdSequence`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A conversation thread identifier based on UUID v4.
///
/// Sent verbatim as `thread_id` so the backend can keep per-thread memory.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ThreadId(uuid::Uuid);

impl ThreadId {
    /// Create a new `ThreadId` from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a new random `ThreadId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Return the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl FromStr for ThreadId {
    type Err = IdError;

    /// Parse a `ThreadId` from a UUID string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
        Ok(Self(uuid))
    }
}

impl fmt::Debug for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadId({})", self.0)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ThreadId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ThreadId> for String {
    fn from(id: ThreadId) -> Self {
        id.0.to_string()
    }
}

/// Identifies one message inside a thread's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(u64);

impl MessageId {
    /// Wrap a raw counter value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Return the raw counter value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Identifies one request/response exchange.
///
/// Every fragment read off the wire is tagged with the session that produced
/// it, so fragments from a superseded session can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw counter value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Return the raw counter value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Monotonic source of message and session identifiers.
#[derive(Debug, Default)]
pub struct IdSequence {
    next: u64,
}

impl IdSequence {
    /// Create a sequence starting at 1.
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    fn bump(&mut self) -> u64 {
        // A zero-initialised (Default) sequence still never hands out 0.
        if self.next == 0 {
            self.next = 1;
        }
        let id = self.next;
        self.next += 1;
        id
    }

    /// Allocate the next message identifier.
    pub fn next_message(&mut self) -> MessageId {
        MessageId(self.bump())
    }

    /// Allocate the next session identifier.
    pub fn next_session(&mut self) -> SessionId {
        SessionId(self.bump())
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_id_roundtrip() {
        let id = ThreadId::generate();
        let parsed = ThreadId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn thread_id_serializes_as_plain_string() {
        let uuid = uuid::Uuid::new_v4();
        let id = ThreadId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
        let parsed: ThreadId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn thread_id_invalid_uuid() {
        let result = ThreadId::from_str("not-a-uuid");
        assert!(matches!(result, Err(IdError::InvalidUuid)));
    }

    #[test]
    fn sequence_is_monotonic_across_kinds() {
        let mut seq = IdSequence::new();
        let m1 = seq.next_message();
        let s1 = seq.next_session();
        let m2 = seq.next_message();
        assert!(m1 < m2);
        assert_eq!(s1.get(), m1.get() + 1);
    }

    #[test]
    fn default_sequence_skips_zero() {
        let mut seq = IdSequence::default();
        assert_eq!(seq.next_session().get(), 1);
    }
}
