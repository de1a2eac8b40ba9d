//! Internal Rust models matching the database schema.
//!
//! Status columns are stored as TEXT using the `Display` spelling of the
//! enums in `stemforge-common`. Free-form per-row metadata lives in a JSON
//! `meta` column and is modelled by the `*Meta` structs below; every field
//! carries `#[serde(default)]` so older rows keep deserializing.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stemforge_common::{
    PlaylistId, PlaylistStatus, StemKey, StemStatus, StemType, TrackId, TrackStatus,
};

/// Metadata stored alongside a playlist checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistMeta {
    /// Channels every track of the run publishes to.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Run profile name (`full` or `lightweight`).
    #[serde(default)]
    pub profile: Option<String>,
    /// Ordered track ids of the run, so tracks that never started can be resumed.
    #[serde(default)]
    pub track_ids: Vec<TrackId>,
}

/// Playlist-level checkpoint row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistCheckpoint {
    pub id: PlaylistId,
    pub status: PlaylistStatus,
    pub total_tracks: u32,
    pub processed_tracks: u32,
    pub meta: PlaylistMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A successful publish of one stem to one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRecord {
    pub channel: String,
    pub stem: StemType,
    pub item_id: String,
    pub published_at: DateTime<Utc>,
}

/// Written before a publish call; a matching `PublishRecord` is written after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishIntent {
    pub channel: String,
    pub stem: StemType,
    pub started_at: DateTime<Utc>,
}

/// Metadata stored alongside a track checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMeta {
    #[serde(default)]
    pub required_stems: BTreeSet<StemType>,
    #[serde(default)]
    pub completed_stems: BTreeSet<StemType>,
    /// Last stage that finished successfully.
    #[serde(default)]
    pub last_stage: Option<TrackStatus>,
    #[serde(default)]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub publish_intents: Vec<PublishIntent>,
    #[serde(default)]
    pub publish_results: Vec<PublishRecord>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
}

impl TrackMeta {
    /// Whether `stem` was already published to `channel`.
    pub fn is_published(&self, channel: &str, stem: StemType) -> bool {
        self.publish_results
            .iter()
            .any(|r| r.channel == channel && r.stem == stem)
    }

    /// Intents with no matching result: the process stopped mid-publish.
    pub fn unresolved_intents(&self) -> Vec<&PublishIntent> {
        self.publish_intents
            .iter()
            .filter(|i| !self.is_published(&i.channel, i.stem))
            .collect()
    }
}

/// Track-level checkpoint row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackCheckpoint {
    pub id: TrackId,
    pub playlist_id: PlaylistId,
    pub status: TrackStatus,
    pub meta: TrackMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stem-level checkpoint row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemCheckpoint {
    pub key: StemKey,
    pub track_id: TrackId,
    pub stem_type: StemType,
    pub file_path: String,
    pub status: StemStatus,
    /// Hex SHA-256 of the file content.
    pub fingerprint: Option<String>,
    pub size_bytes: Option<u64>,
    /// Separation model that produced the sources of this stem.
    pub model: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Entry of the file-reference cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFile {
    pub key: String,
    pub path: String,
    pub cached_at: DateTime<Utc>,
}

/// Structured record of an external call that ended in a degraded default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: i64,
    pub operation: String,
    pub identifiers: BTreeMap<String, String>,
    pub error: String,
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate counts over the checkpoint store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStats {
    pub playlists_total: u64,
    pub playlists_incomplete: u64,
    pub tracks_total: u64,
    pub tracks_completed: u64,
    pub tracks_failed: u64,
    pub stems_completed: u64,
    pub stems_invalid: u64,
    pub cached_files: u64,
    pub failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_meta_defaults_from_empty_json() {
        let meta: TrackMeta = serde_json::from_str("{}").unwrap();
        assert!(meta.required_stems.is_empty());
        assert!(meta.last_stage.is_none());
        assert!(meta.publish_results.is_empty());
    }

    #[test]
    fn test_unresolved_intents() {
        let now = Utc::now();
        let meta = TrackMeta {
            publish_intents: vec![
                PublishIntent {
                    channel: "main".into(),
                    stem: StemType::Acapella,
                    started_at: now,
                },
                PublishIntent {
                    channel: "main".into(),
                    stem: StemType::Drums,
                    started_at: now,
                },
            ],
            publish_results: vec![PublishRecord {
                channel: "main".into(),
                stem: StemType::Acapella,
                item_id: "vid-1".into(),
                published_at: now,
            }],
            ..Default::default()
        };

        assert!(meta.is_published("main", StemType::Acapella));
        assert!(!meta.is_published("drums", StemType::Acapella));

        let open = meta.unresolved_intents();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].stem, StemType::Drums);
    }
}
