//! Playlist checkpoint queries.
//!
//! Rows are upserted on every status change. `update_seq` is a store-wide
//! counter bumped on each write, giving a stable least-recently-updated order
//! even when two writes share a timestamp.

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use stemforge_common::{Error, PlaylistId, PlaylistStatus, Result};

use super::{parse_json, parse_text, parse_timestamp};
use crate::models::{PlaylistCheckpoint, PlaylistMeta};

const SELECT_COLUMNS: &str = "SELECT id, status, total_tracks, processed_tracks, meta, created_at, updated_at
     FROM playlist_checkpoints";

fn row_to_playlist(row: &Row) -> rusqlite::Result<PlaylistCheckpoint> {
    Ok(PlaylistCheckpoint {
        id: PlaylistId::from(row.get::<_, String>(0)?),
        status: parse_text(1, row.get(1)?)?,
        total_tracks: row.get(2)?,
        processed_tracks: row.get(3)?,
        meta: parse_json(4, row.get(4)?)?,
        created_at: parse_timestamp(5, row.get(5)?)?,
        updated_at: parse_timestamp(6, row.get(6)?)?,
    })
}

/// Insert or overwrite a playlist checkpoint.
///
/// `processed_tracks` is clamped to `total_tracks`. `created_at` survives
/// overwrites.
pub fn upsert_playlist(
    conn: &Connection,
    id: &PlaylistId,
    status: PlaylistStatus,
    total_tracks: u32,
    processed_tracks: u32,
    meta: &PlaylistMeta,
) -> Result<PlaylistCheckpoint> {
    let now = Utc::now().to_rfc3339();
    let meta_json = serde_json::to_string(meta)?;
    let processed = processed_tracks.min(total_tracks);

    conn.execute(
        "INSERT INTO playlist_checkpoints
             (id, status, total_tracks, processed_tracks, meta, created_at, updated_at, update_seq)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6,
                 (SELECT COALESCE(MAX(update_seq), 0) + 1 FROM playlist_checkpoints))
         ON CONFLICT(id) DO UPDATE SET
             status = excluded.status,
             total_tracks = excluded.total_tracks,
             processed_tracks = excluded.processed_tracks,
             meta = excluded.meta,
             updated_at = excluded.updated_at,
             update_seq = excluded.update_seq",
        params![
            id.as_str(),
            status.to_string(),
            total_tracks,
            processed,
            meta_json,
            now
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    get_playlist(conn, id)?
        .ok_or_else(|| Error::internal(format!("Playlist checkpoint {} vanished after upsert", id)))
}

/// Get a playlist checkpoint by id.
pub fn get_playlist(conn: &Connection, id: &PlaylistId) -> Result<Option<PlaylistCheckpoint>> {
    let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
    match conn.query_row(&sql, params![id.as_str()], row_to_playlist) {
        Ok(playlist) => Ok(Some(playlist)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Whether a playlist checkpoint exists.
pub fn playlist_exists(conn: &Connection, id: &PlaylistId) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM playlist_checkpoints WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(count > 0)
}

/// List every playlist, least recently updated first.
pub fn list_playlists(conn: &Connection) -> Result<Vec<PlaylistCheckpoint>> {
    let sql = format!("{} ORDER BY update_seq ASC", SELECT_COLUMNS);
    collect(conn, &sql, params![])
}

/// List playlists that are neither completed nor failed, least recently updated first.
pub fn list_incomplete_playlists(conn: &Connection) -> Result<Vec<PlaylistCheckpoint>> {
    let sql = format!(
        "{} WHERE status NOT IN ('completed', 'failed') ORDER BY update_seq ASC",
        SELECT_COLUMNS
    );
    collect(conn, &sql, params![])
}

/// Recount completed tracks of a playlist in a single statement.
///
/// A track counts when it was recorded under this playlist or is listed in
/// the playlist's `track_ids`, so tracks completed by another run are
/// included. The stored count is clamped to the declared total. Returns the
/// new count, or `None` when the playlist is unknown.
pub fn refresh_processed_count(conn: &Connection, id: &PlaylistId) -> Result<Option<u32>> {
    let affected = conn
        .execute(
            "UPDATE playlist_checkpoints SET
                 processed_tracks = MIN(total_tracks,
                     (SELECT COUNT(*) FROM track_checkpoints
                      WHERE status = 'completed'
                        AND (playlist_id = ?1
                             OR id IN (SELECT value FROM json_each(playlist_checkpoints.meta, '$.track_ids'))))),
                 updated_at = ?2,
                 update_seq = (SELECT COALESCE(MAX(update_seq), 0) + 1 FROM playlist_checkpoints)
             WHERE id = ?1",
            params![id.as_str(), Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if affected == 0 {
        return Ok(None);
    }

    let count: u32 = conn
        .query_row(
            "SELECT processed_tracks FROM playlist_checkpoints WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(Some(count))
}

/// Delete every playlist checkpoint. Returns the number of rows removed.
pub fn delete_all(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM playlist_checkpoints", [])
        .map_err(|e| Error::database(e.to_string()))
}

fn collect(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<PlaylistCheckpoint>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| Error::database(e.to_string()))?;

    let playlists = stmt
        .query_map(params, row_to_playlist)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(playlists)
}
