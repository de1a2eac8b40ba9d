//! Durable progress ledger for playlists, tracks and stems.
//!
//! All checkpoint writes go through [`CheckpointManager`]. Writes are best
//! effort: a persistence failure is logged and reported through the return
//! value, but never aborts the stage that triggered it.

use std::path::{Path, PathBuf};

use serde::Serialize;
use stemforge_common::{
    PlaylistId, PlaylistStatus, Result, StemKey, StemStatus, StemType, TrackId, TrackStatus,
};
use stemforge_db::models::{
    FailureRecord, PlaylistCheckpoint, PlaylistMeta, RecoveryStats, StemCheckpoint,
    TrackCheckpoint, TrackMeta,
};
use stemforge_db::pool::{get_conn, init_memory_pool, init_pool, DbPool, PooledConnection};
use stemforge_db::queries::{failures, file_cache, maintenance, playlists, stems, tracks};

use crate::resilience::{FailureLog, FailureReport};

/// Outcome of [`CheckpointManager::record_track`].
#[derive(Debug, Clone, PartialEq)]
pub enum TrackWrite {
    Written(Box<TrackCheckpoint>),
    /// The owning playlist has no checkpoint; nothing was written.
    UnknownPlaylist,
    /// The stored track is already completed and is never overwritten.
    AlreadyCompleted,
    /// A `completed` write was rejected because these required stems are not completed.
    MissingStems(Vec<StemType>),
    /// The store could not be written.
    Failed(String),
}

impl TrackWrite {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

/// Stem fields written by [`CheckpointManager::record_stem`].
#[derive(Debug, Clone, PartialEq)]
pub struct StemRecord {
    pub stem_type: StemType,
    pub file_path: PathBuf,
    pub status: StemStatus,
    pub fingerprint: Option<String>,
    pub size_bytes: Option<u64>,
    pub model: Option<String>,
}

/// Full dump of the store, as written by [`CheckpointManager::export_json`].
#[derive(Debug, Serialize)]
pub struct CheckpointSnapshot {
    pub playlists: Vec<PlaylistCheckpoint>,
    pub tracks: Vec<TrackCheckpoint>,
    pub stems: Vec<StemCheckpoint>,
    pub failures: Vec<FailureRecord>,
    pub stats: RecoveryStats,
}

/// Checkpoint store backed by SQLite.
#[derive(Clone)]
pub struct CheckpointManager {
    pool: DbPool,
}

impl CheckpointManager {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open (and migrate) the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let pool = init_pool(&path.to_string_lossy())?;
        Ok(Self::new(pool))
    }

    /// Store that lives only as long as this process.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(init_memory_pool()?))
    }

    /// Upsert a playlist checkpoint. The processed count is clamped to the total.
    pub fn record_playlist(
        &self,
        id: &PlaylistId,
        status: PlaylistStatus,
        total_tracks: u32,
        processed_tracks: u32,
        meta: &PlaylistMeta,
    ) -> Option<PlaylistCheckpoint> {
        if processed_tracks > total_tracks {
            tracing::warn!(
                playlist_id = %id,
                processed_tracks,
                total_tracks,
                "Processed count exceeds total, clamping"
            );
        }

        let result = get_conn(&self.pool).and_then(|conn| {
            playlists::upsert_playlist(&conn, id, status, total_tracks, processed_tracks, meta)
        });

        match result {
            Ok(playlist) => {
                tracing::debug!(playlist_id = %id, status = %status, "Playlist checkpoint written");
                Some(playlist)
            }
            Err(e) => {
                tracing::error!(playlist_id = %id, error = %e, "Failed to write playlist checkpoint");
                None
            }
        }
    }

    /// Upsert a track checkpoint.
    ///
    /// Skipped when the playlist is unknown or the stored track is already
    /// completed. A `completed` write is rejected unless every required stem
    /// has a completed stem checkpoint.
    pub fn record_track(
        &self,
        id: &TrackId,
        playlist_id: &PlaylistId,
        status: TrackStatus,
        meta: &TrackMeta,
    ) -> TrackWrite {
        let conn = match get_conn(&self.pool) {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(track_id = %id, error = %e, "Failed to write track checkpoint");
                return TrackWrite::Failed(e.to_string());
            }
        };

        let result = (|| -> Result<TrackWrite> {
            if !playlists::playlist_exists(&conn, playlist_id)? {
                tracing::warn!(
                    track_id = %id,
                    playlist_id = %playlist_id,
                    "Skipping track checkpoint for unknown playlist"
                );
                return Ok(TrackWrite::UnknownPlaylist);
            }

            if let Some(existing) = tracks::get_track(&conn, id)? {
                if existing.status == TrackStatus::Completed {
                    tracing::debug!(track_id = %id, "Track already completed, not overwriting");
                    return Ok(TrackWrite::AlreadyCompleted);
                }
            }

            if status == TrackStatus::Completed {
                let mut missing = Vec::new();
                for stem in &meta.required_stems {
                    let key = StemKey::new(id, *stem);
                    let done = stems::get_stem(&conn, &key)?
                        .map(|s| s.status == StemStatus::Completed)
                        .unwrap_or(false);
                    if !done {
                        missing.push(*stem);
                    }
                }
                if !missing.is_empty() {
                    tracing::error!(
                        track_id = %id,
                        missing = ?missing,
                        "Rejected completed checkpoint with incomplete stems"
                    );
                    return Ok(TrackWrite::MissingStems(missing));
                }
            }

            let track = tracks::upsert_track(&conn, id, playlist_id, status, meta)?;
            Ok(TrackWrite::Written(Box::new(track)))
        })();

        match result {
            Ok(write) => {
                if write.is_written() {
                    tracing::debug!(track_id = %id, status = %status, "Track checkpoint written");
                }
                write
            }
            Err(e) => {
                tracing::error!(track_id = %id, error = %e, "Failed to write track checkpoint");
                TrackWrite::Failed(e.to_string())
            }
        }
    }

    /// Move a track back to `pending` under `playlist_id`, even when it is
    /// completed. Used when a new run needs stems or channels the completed
    /// track never delivered; its stem checkpoints and publish results are
    /// kept so only the difference is produced.
    pub fn reopen_track(
        &self,
        id: &TrackId,
        playlist_id: &PlaylistId,
        meta: &TrackMeta,
    ) -> TrackWrite {
        let result = get_conn(&self.pool).and_then(|conn| {
            if !playlists::playlist_exists(&conn, playlist_id)? {
                tracing::warn!(
                    track_id = %id,
                    playlist_id = %playlist_id,
                    "Not reopening track for unknown playlist"
                );
                return Ok(TrackWrite::UnknownPlaylist);
            }
            let track = tracks::upsert_track(&conn, id, playlist_id, TrackStatus::Pending, meta)?;
            Ok(TrackWrite::Written(Box::new(track)))
        });

        match result {
            Ok(write) => {
                if write.is_written() {
                    tracing::debug!(track_id = %id, playlist_id = %playlist_id, "Track reopened");
                }
                write
            }
            Err(e) => {
                tracing::error!(track_id = %id, error = %e, "Failed to reopen track");
                TrackWrite::Failed(e.to_string())
            }
        }
    }

    /// Upsert a stem checkpoint.
    ///
    /// A completed stem whose file still exists is never replaced by a
    /// different artifact.
    pub fn record_stem(&self, key: &StemKey, track_id: &TrackId, stem: &StemRecord) -> bool {
        let file_path = stem.file_path.to_string_lossy().into_owned();

        let result = get_conn(&self.pool).and_then(|conn| {
            if let Some(existing) = stems::get_stem(&conn, key)? {
                let replaces_artifact = existing.file_path != file_path
                    || existing.fingerprint != stem.fingerprint
                    || existing.status != stem.status;
                if existing.status == StemStatus::Completed
                    && Path::new(&existing.file_path).exists()
                    && replaces_artifact
                {
                    tracing::warn!(
                        stem_key = %key,
                        "Stem already completed with an existing file, keeping it"
                    );
                    return Ok(false);
                }
            }

            stems::upsert_stem(
                &conn,
                &stems::StemUpsert {
                    key,
                    track_id,
                    stem_type: stem.stem_type,
                    file_path: &file_path,
                    status: stem.status,
                    fingerprint: stem.fingerprint.as_deref(),
                    size_bytes: stem.size_bytes,
                    model: stem.model.as_deref(),
                },
            )?;
            Ok(true)
        });

        match result {
            Ok(written) => {
                if written {
                    tracing::debug!(stem_key = %key, status = %stem.status, "Stem checkpoint written");
                }
                written
            }
            Err(e) => {
                tracing::error!(stem_key = %key, error = %e, "Failed to write stem checkpoint");
                false
            }
        }
    }

    /// Playlists that are neither completed nor failed, least recently updated first.
    pub fn list_incomplete_playlists(&self) -> Vec<PlaylistCheckpoint> {
        match get_conn(&self.pool).and_then(|conn| playlists::list_incomplete_playlists(&conn)) {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list incomplete playlists");
                Vec::new()
            }
        }
    }

    /// Non-completed tracks of a playlist, least recently updated first.
    pub fn list_incomplete_tracks(&self, playlist_id: &PlaylistId) -> Vec<TrackCheckpoint> {
        match get_conn(&self.pool)
            .and_then(|conn| tracks::list_incomplete_tracks(&conn, playlist_id))
        {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(playlist_id = %playlist_id, error = %e, "Failed to list incomplete tracks");
                Vec::new()
            }
        }
    }

    /// Remember where the file for `key` lives.
    pub fn cache_file_reference(&self, key: &str, path: &Path) {
        let result =
            get_conn(&self.pool).and_then(|conn| file_cache::put(&conn, key, &path.to_string_lossy()));
        if let Err(e) = result {
            tracing::error!(key, error = %e, "Failed to cache file reference");
        }
    }

    /// Look up a cached file. A reference whose file no longer exists is
    /// evicted and reported as a miss.
    pub fn lookup_cached_file(&self, key: &str) -> Option<PathBuf> {
        let conn = match get_conn(&self.pool) {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(key, error = %e, "Failed to read file cache");
                return None;
            }
        };

        let entry = match file_cache::get(&conn, key) {
            Ok(entry) => entry?,
            Err(e) => {
                tracing::error!(key, error = %e, "Failed to read file cache");
                return None;
            }
        };

        let path = PathBuf::from(&entry.path);
        if path.exists() {
            return Some(path);
        }

        tracing::debug!(key, path = %entry.path, "Cached file is gone, evicting");
        if let Err(e) = file_cache::delete(&conn, key) {
            tracing::warn!(key, error = %e, "Failed to evict stale file reference");
        }
        None
    }

    pub fn playlist(&self, id: &PlaylistId) -> Option<PlaylistCheckpoint> {
        self.read(|conn| playlists::get_playlist(conn, id))
            .flatten()
    }

    pub fn track(&self, id: &TrackId) -> Option<TrackCheckpoint> {
        self.read(|conn| tracks::get_track(conn, id)).flatten()
    }

    pub fn stem(&self, key: &StemKey) -> Option<StemCheckpoint> {
        self.read(|conn| stems::get_stem(conn, key)).flatten()
    }

    pub fn stems_for_track(&self, track_id: &TrackId) -> Vec<StemCheckpoint> {
        self.read(|conn| stems::list_stems_for_track(conn, track_id))
            .unwrap_or_default()
    }

    pub fn tracks_for_playlist(&self, playlist_id: &PlaylistId) -> Vec<TrackCheckpoint> {
        self.read(|conn| tracks::list_tracks_for_playlist(conn, playlist_id))
            .unwrap_or_default()
    }

    /// Recount completed tracks of a playlist (clamped to its total).
    pub fn refresh_processed_count(&self, playlist_id: &PlaylistId) -> Option<u32> {
        self.read(|conn| playlists::refresh_processed_count(conn, playlist_id))
            .flatten()
    }

    pub fn failures(&self) -> Vec<FailureRecord> {
        self.read(|conn| failures::list_failures(conn))
            .unwrap_or_default()
    }

    pub fn recovery_stats(&self) -> Result<RecoveryStats> {
        let conn = get_conn(&self.pool)?;
        maintenance::recovery_stats(&conn)
    }

    /// Remove every checkpoint, cached reference and failure record.
    pub fn clear(&self) -> Result<usize> {
        let conn = get_conn(&self.pool)?;
        let removed = maintenance::clear_all(&conn)?;
        tracing::info!(removed, "Cleared checkpoint store");
        Ok(removed)
    }

    pub fn snapshot(&self) -> Result<CheckpointSnapshot> {
        let conn = get_conn(&self.pool)?;
        Ok(CheckpointSnapshot {
            playlists: playlists::list_playlists(&conn)?,
            tracks: tracks::list_all(&conn)?,
            stems: stems::list_all(&conn)?,
            failures: failures::list_failures(&conn)?,
            stats: maintenance::recovery_stats(&conn)?,
        })
    }

    /// Write a pretty-printed JSON snapshot of the store to `path`.
    pub fn export_json(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot()?;
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Exported checkpoints");
        Ok(())
    }

    fn read<T>(
        &self,
        query: impl FnOnce(&PooledConnection) -> Result<T>,
    ) -> Option<T> {
        match get_conn(&self.pool).and_then(|conn| query(&conn)) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(error = %e, "Checkpoint read failed");
                None
            }
        }
    }
}

impl FailureLog for CheckpointManager {
    fn record(&self, report: &FailureReport) {
        let result = get_conn(&self.pool).and_then(|conn| {
            failures::insert_failure(
                &conn,
                &report.operation,
                &report.identifiers,
                &report.error,
                report.attempts,
            )
        });
        if let Err(e) = result {
            tracing::error!(
                operation = %report.operation,
                error = %e,
                "Failed to write failure record"
            );
        }
    }
}
