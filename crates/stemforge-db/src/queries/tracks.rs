//! Track checkpoint queries.

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use stemforge_common::{Error, PlaylistId, Result, TrackId, TrackStatus};

use super::{parse_json, parse_text, parse_timestamp};
use crate::models::{TrackCheckpoint, TrackMeta};

const SELECT_COLUMNS: &str = "SELECT id, playlist_id, status, meta, created_at, updated_at
     FROM track_checkpoints";

fn row_to_track(row: &Row) -> rusqlite::Result<TrackCheckpoint> {
    Ok(TrackCheckpoint {
        id: TrackId::from(row.get::<_, String>(0)?),
        playlist_id: PlaylistId::from(row.get::<_, String>(1)?),
        status: parse_text(2, row.get(2)?)?,
        meta: parse_json(3, row.get(3)?)?,
        created_at: parse_timestamp(4, row.get(4)?)?,
        updated_at: parse_timestamp(5, row.get(5)?)?,
    })
}

/// Insert or overwrite a track checkpoint.
///
/// This is a plain upsert; the rules about completed tracks live in the
/// checkpoint manager.
pub fn upsert_track(
    conn: &Connection,
    id: &TrackId,
    playlist_id: &PlaylistId,
    status: TrackStatus,
    meta: &TrackMeta,
) -> Result<TrackCheckpoint> {
    let now = Utc::now().to_rfc3339();
    let meta_json = serde_json::to_string(meta)?;

    conn.execute(
        "INSERT INTO track_checkpoints
             (id, playlist_id, status, meta, created_at, updated_at, update_seq)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5,
                 (SELECT COALESCE(MAX(update_seq), 0) + 1 FROM track_checkpoints))
         ON CONFLICT(id) DO UPDATE SET
             playlist_id = excluded.playlist_id,
             status = excluded.status,
             meta = excluded.meta,
             updated_at = excluded.updated_at,
             update_seq = excluded.update_seq",
        params![
            id.as_str(),
            playlist_id.as_str(),
            status.to_string(),
            meta_json,
            now
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    get_track(conn, id)?
        .ok_or_else(|| Error::internal(format!("Track checkpoint {} vanished after upsert", id)))
}

/// Get a track checkpoint by id.
pub fn get_track(conn: &Connection, id: &TrackId) -> Result<Option<TrackCheckpoint>> {
    let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
    match conn.query_row(&sql, params![id.as_str()], row_to_track) {
        Ok(track) => Ok(Some(track)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List all tracks of a playlist, least recently updated first.
pub fn list_tracks_for_playlist(
    conn: &Connection,
    playlist_id: &PlaylistId,
) -> Result<Vec<TrackCheckpoint>> {
    let sql = format!(
        "{} WHERE playlist_id = ?1 ORDER BY update_seq ASC",
        SELECT_COLUMNS
    );
    collect(conn, &sql, playlist_id)
}

/// List every track checkpoint, least recently updated first.
pub fn list_all(conn: &Connection) -> Result<Vec<TrackCheckpoint>> {
    let sql = format!("{} ORDER BY update_seq ASC", SELECT_COLUMNS);
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::database(e.to_string()))?;

    let tracks = stmt
        .query_map([], row_to_track)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(tracks)
}

/// List tracks of a playlist that are not completed (failed ones included),
/// least recently updated first.
pub fn list_incomplete_tracks(
    conn: &Connection,
    playlist_id: &PlaylistId,
) -> Result<Vec<TrackCheckpoint>> {
    let sql = format!(
        "{} WHERE playlist_id = ?1 AND status != 'completed' ORDER BY update_seq ASC",
        SELECT_COLUMNS
    );
    collect(conn, &sql, playlist_id)
}

/// Count tracks of a playlist with the given status.
pub fn count_by_status(
    conn: &Connection,
    playlist_id: &PlaylistId,
    status: TrackStatus,
) -> Result<u32> {
    conn.query_row(
        "SELECT COUNT(*) FROM track_checkpoints WHERE playlist_id = ?1 AND status = ?2",
        params![playlist_id.as_str(), status.to_string()],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Delete every track checkpoint. Returns the number of rows removed.
pub fn delete_all(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM track_checkpoints", [])
        .map_err(|e| Error::database(e.to_string()))
}

fn collect(
    conn: &Connection,
    sql: &str,
    playlist_id: &PlaylistId,
) -> Result<Vec<TrackCheckpoint>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| Error::database(e.to_string()))?;

    let tracks = stmt
        .query_map(params![playlist_id.as_str()], row_to_track)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(tracks)
}
