//! Recovery statistics and store-wide clearing.

use rusqlite::Connection;
use stemforge_common::{Error, Result};

use super::{failures, file_cache, playlists, stems, tracks};
use crate::models::RecoveryStats;

fn count(conn: &Connection, sql: &str) -> Result<u64> {
    conn.query_row(sql, [], |row| row.get::<_, i64>(0))
        .map(|n| n.max(0) as u64)
        .map_err(|e| Error::database(e.to_string()))
}

/// Aggregate counts across every checkpoint table.
pub fn recovery_stats(conn: &Connection) -> Result<RecoveryStats> {
    Ok(RecoveryStats {
        playlists_total: count(conn, "SELECT COUNT(*) FROM playlist_checkpoints")?,
        playlists_incomplete: count(
            conn,
            "SELECT COUNT(*) FROM playlist_checkpoints WHERE status NOT IN ('completed', 'failed')",
        )?,
        tracks_total: count(conn, "SELECT COUNT(*) FROM track_checkpoints")?,
        tracks_completed: count(
            conn,
            "SELECT COUNT(*) FROM track_checkpoints WHERE status = 'completed'",
        )?,
        tracks_failed: count(
            conn,
            "SELECT COUNT(*) FROM track_checkpoints WHERE status = 'failed'",
        )?,
        stems_completed: count(
            conn,
            "SELECT COUNT(*) FROM stem_checkpoints WHERE status = 'completed'",
        )?,
        stems_invalid: count(
            conn,
            "SELECT COUNT(*) FROM stem_checkpoints WHERE status = 'invalid'",
        )?,
        cached_files: count(conn, "SELECT COUNT(*) FROM file_cache")?,
        failures: count(conn, "SELECT COUNT(*) FROM failure_log")?,
    })
}

/// Remove every checkpoint, cached reference and failure record in one transaction.
pub fn clear_all(conn: &Connection) -> Result<usize> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let removed = playlists::delete_all(&tx)?
        + tracks::delete_all(&tx)?
        + stems::delete_all(&tx)?
        + file_cache::delete_all(&tx)?
        + failures::delete_all(&tx)?;

    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PlaylistMeta, TrackMeta};
    use crate::pool::{init_memory_pool, PooledConnection};
    use std::collections::BTreeMap;
    use stemforge_common::{PlaylistId, PlaylistStatus, TrackId, TrackStatus};

    fn setup_test_db() -> PooledConnection {
        let pool = init_memory_pool().unwrap();
        pool.get().unwrap()
    }

    #[test]
    fn test_stats_and_clear() {
        let conn = setup_test_db();
        let playlist = PlaylistId::from("P1");

        playlists::upsert_playlist(
            &conn,
            &playlist,
            PlaylistStatus::InProgress,
            2,
            0,
            &PlaylistMeta::default(),
        )
        .unwrap();
        tracks::upsert_track(
            &conn,
            &TrackId::from("T1"),
            &playlist,
            TrackStatus::Completed,
            &TrackMeta::default(),
        )
        .unwrap();
        tracks::upsert_track(
            &conn,
            &TrackId::from("T2"),
            &playlist,
            TrackStatus::Failed,
            &TrackMeta::default(),
        )
        .unwrap();
        file_cache::put(&conn, "T1:source", "/tmp/t1.mp3").unwrap();
        failures::insert_failure(&conn, "catalog.track", &BTreeMap::new(), "boom", 3).unwrap();

        let stats = recovery_stats(&conn).unwrap();
        assert_eq!(stats.playlists_total, 1);
        assert_eq!(stats.playlists_incomplete, 1);
        assert_eq!(stats.tracks_total, 2);
        assert_eq!(stats.tracks_completed, 1);
        assert_eq!(stats.tracks_failed, 1);
        assert_eq!(stats.cached_files, 1);
        assert_eq!(stats.failures, 1);

        assert_eq!(clear_all(&conn).unwrap(), 5);
        assert_eq!(recovery_stats(&conn).unwrap(), RecoveryStats::default());
    }
}
