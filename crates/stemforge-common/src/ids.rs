//! Typed identifier wrappers for type safety across stemforge.
//!
//! Playlist and track identifiers come from the external catalog, so they are
//! opaque strings rather than UUIDs. The newtypes keep a track id from being
//! passed where a playlist id is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::StemType;

/// Identifier for a playlist (batch) run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaylistId(String);

impl PlaylistId {
    /// Generate a fresh identifier for an ad-hoc batch that has no catalog id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("batch-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlaylistId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PlaylistId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Catalog identifier of a single track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TrackId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TrackId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Checkpoint key of one stem of one track: `<track id>:<stem type>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StemKey(String);

impl StemKey {
    pub fn new(track_id: &TrackId, stem: StemType) -> Self {
        Self(format!("{}:{}", track_id, stem))
    }

    /// Key under which the acquired source audio of a track is cached.
    pub fn source_audio(track_id: &TrackId) -> Self {
        Self(format!("{}:source", track_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for StemKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for StemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
