use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier a participant carries on the signaling channel
///
/// The transport assigns it (e.g. the socket id) and it is stable for the
/// lifetime of the connection. Every outbound envelope is stamped with it.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Registry-assigned identifier of one peer session
///
/// Ids are handed out in increasing order and never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub const FIRST: SessionId = SessionId(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// The id following this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_display() {
        let peer = PeerId::new("socket-abc");
        assert_eq!(peer.to_string(), "socket-abc");
        assert_eq!(peer.as_str(), "socket-abc");
    }

    #[test]
    fn test_peer_id_serializes_as_plain_string() {
        let peer = PeerId::from("A");
        assert_eq!(serde_json::to_string(&peer).unwrap(), "\"A\"");

        let parsed: PeerId = serde_json::from_str("\"B\"").unwrap();
        assert_eq!(parsed, PeerId::from("B"));
    }

    #[test]
    fn test_session_id_is_monotonic() {
        let first = SessionId::FIRST;
        let second = first.next();
        let third = second.next();

        assert!(first < second && second < third);
        assert_eq!(third.value(), 2);
    }
}
