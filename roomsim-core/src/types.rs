//! Common identifiers shared by the room and publish layers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned identifier of a published track
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackSid(String);

impl TrackSid {
    /// Generate a fresh sid in the `TR_` namespace
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("TR_{}", nanoid::nanoid!(12)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackSid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TrackSid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identity of a participant in a room
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantIdentity(String);

impl ParticipantIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ParticipantIdentity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ParticipantIdentity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
