//! Catalog and enrichment read from a local TOML manifest.
//!
//! ```toml
//! [[tracks]]
//! id = "4uLU6hMCjMI75M1A2tKUQC"
//! title = "Never Gonna Give You Up"
//! artist = "Rick Astley"
//! duration_ms = 213000
//! artwork = "covers/rick.jpg"
//! bpm = 113
//! key = "A♭ Major"
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use stemforge_common::TrackId;

use super::{CatalogService, EnrichmentService, MusicalKey, ServiceError, TrackMetadata};

#[derive(Debug, Clone, Deserialize)]
struct ManifestTrack {
    id: TrackId,
    title: String,
    artist: String,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    artwork: Option<String>,
    #[serde(default)]
    bpm: Option<u32>,
    #[serde(default)]
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    tracks: Vec<ManifestTrack>,
}

#[derive(Debug, Default)]
pub struct ManifestCatalog {
    tracks: HashMap<TrackId, ManifestTrack>,
}

impl ManifestCatalog {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let catalog = Self::parse(&content)?;
        tracing::info!(path = %path.display(), tracks = catalog.len(), "Loaded catalog manifest");
        Ok(catalog)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let manifest: Manifest = toml::from_str(content).context("Failed to parse manifest")?;
        let tracks = manifest
            .tracks
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        Ok(Self { tracks })
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    fn entry(&self, id: &TrackId) -> Result<&ManifestTrack, ServiceError> {
        self.tracks
            .get(id)
            .ok_or_else(|| ServiceError::Permanent(format!("track {id} is not in the catalog")))
    }
}

#[async_trait]
impl CatalogService for ManifestCatalog {
    async fn track(&self, track_id: &TrackId) -> Result<TrackMetadata, ServiceError> {
        let entry = self.entry(track_id)?;
        Ok(TrackMetadata {
            track_id: entry.id.clone(),
            title: entry.title.clone(),
            artist: entry.artist.clone(),
            duration_ms: entry.duration_ms,
            artwork: entry.artwork.clone(),
        })
    }
}

#[async_trait]
impl EnrichmentService for ManifestCatalog {
    async fn analyze(&self, track: &TrackMetadata) -> Result<MusicalKey, ServiceError> {
        let entry = self.entry(&track.track_id)?;
        match (entry.bpm, entry.key.as_deref()) {
            (Some(bpm), Some(key)) if !key.trim().is_empty() => Ok(MusicalKey {
                bpm,
                key: key.trim().to_string(),
            }),
            _ => Ok(MusicalKey::unknown()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
        [[tracks]]
        id = "T1"
        title = "Song"
        artist = "Artist"
        duration_ms = 180000
        bpm = 120
        key = "A minor"

        [[tracks]]
        id = "T2"
        title = "Other"
        artist = "Someone"
    "#;

    #[tokio::test]
    async fn looks_up_tracks() {
        let catalog = ManifestCatalog::parse(MANIFEST).unwrap();
        assert_eq!(catalog.len(), 2);

        let meta = catalog.track(&TrackId::from("T1")).await.unwrap();
        assert_eq!(meta.title, "Song");
        assert_eq!(meta.duration_ms, 180_000);

        let missing = catalog.track(&TrackId::from("T9")).await.unwrap_err();
        assert!(matches!(missing, ServiceError::Permanent(_)));
    }

    #[tokio::test]
    async fn enrichment_defaults_to_unknown() {
        let catalog = ManifestCatalog::parse(MANIFEST).unwrap();

        let t1 = catalog.track(&TrackId::from("T1")).await.unwrap();
        let key = catalog.analyze(&t1).await.unwrap();
        assert_eq!(key.bpm, 120);
        assert_eq!(key.key, "A minor");

        let t2 = catalog.track(&TrackId::from("T2")).await.unwrap();
        assert!(catalog.analyze(&t2).await.unwrap().is_unknown());
    }

    #[test]
    fn load_reports_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        std::fs::write(&path, "tracks = 5").unwrap();
        assert!(ManifestCatalog::load(&path).is_err());
        assert!(ManifestCatalog::load(&dir.path().join("missing.toml")).is_err());
    }
}
