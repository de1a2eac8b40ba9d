//! Stem checkpoint queries.

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use stemforge_common::{Error, Result, StemKey, StemStatus, StemType, TrackId};

use super::{parse_text, parse_timestamp};
use crate::models::StemCheckpoint;

const SELECT_COLUMNS: &str = "SELECT key, track_id, stem_type, file_path, status, fingerprint, size_bytes, model, updated_at
     FROM stem_checkpoints";

fn row_to_stem(row: &Row) -> rusqlite::Result<StemCheckpoint> {
    Ok(StemCheckpoint {
        key: StemKey::from(row.get::<_, String>(0)?),
        track_id: TrackId::from(row.get::<_, String>(1)?),
        stem_type: parse_text(2, row.get(2)?)?,
        file_path: row.get(3)?,
        status: parse_text(4, row.get(4)?)?,
        fingerprint: row.get(5)?,
        size_bytes: row.get::<_, Option<i64>>(6)?.map(|n| n.max(0) as u64),
        model: row.get(7)?,
        updated_at: parse_timestamp(8, row.get(8)?)?,
    })
}

/// Fields written by a stem upsert.
#[derive(Debug, Clone)]
pub struct StemUpsert<'a> {
    pub key: &'a StemKey,
    pub track_id: &'a TrackId,
    pub stem_type: StemType,
    pub file_path: &'a str,
    pub status: StemStatus,
    pub fingerprint: Option<&'a str>,
    pub size_bytes: Option<u64>,
    pub model: Option<&'a str>,
}

/// Insert or overwrite a stem checkpoint.
pub fn upsert_stem(conn: &Connection, stem: &StemUpsert<'_>) -> Result<StemCheckpoint> {
    conn.execute(
        "INSERT INTO stem_checkpoints
             (key, track_id, stem_type, file_path, status, fingerprint, size_bytes, model, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(key) DO UPDATE SET
             track_id = excluded.track_id,
             stem_type = excluded.stem_type,
             file_path = excluded.file_path,
             status = excluded.status,
             fingerprint = excluded.fingerprint,
             size_bytes = excluded.size_bytes,
             model = excluded.model,
             updated_at = excluded.updated_at",
        params![
            stem.key.as_str(),
            stem.track_id.as_str(),
            stem.stem_type.to_string(),
            stem.file_path,
            stem.status.to_string(),
            stem.fingerprint,
            stem.size_bytes.map(|n| n.min(i64::MAX as u64) as i64),
            stem.model,
            Utc::now().to_rfc3339(),
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    get_stem(conn, stem.key)?
        .ok_or_else(|| Error::internal(format!("Stem checkpoint {} vanished after upsert", stem.key)))
}

/// Get a stem checkpoint by key.
pub fn get_stem(conn: &Connection, key: &StemKey) -> Result<Option<StemCheckpoint>> {
    let sql = format!("{} WHERE key = ?1", SELECT_COLUMNS);
    match conn.query_row(&sql, params![key.as_str()], row_to_stem) {
        Ok(stem) => Ok(Some(stem)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List every stem checkpoint of a track, ordered by stem type.
pub fn list_stems_for_track(conn: &Connection, track_id: &TrackId) -> Result<Vec<StemCheckpoint>> {
    let sql = format!("{} WHERE track_id = ?1 ORDER BY key ASC", SELECT_COLUMNS);
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::database(e.to_string()))?;

    let stems = stmt
        .query_map(params![track_id.as_str()], row_to_stem)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(stems)
}

/// List every stem checkpoint, ordered by key.
pub fn list_all(conn: &Connection) -> Result<Vec<StemCheckpoint>> {
    let sql = format!("{} ORDER BY key ASC", SELECT_COLUMNS);
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::database(e.to_string()))?;

    let stems = stmt
        .query_map([], row_to_stem)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(stems)
}

/// Delete every stem checkpoint. Returns the number of rows removed.
pub fn delete_all(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM stem_checkpoints", [])
        .map_err(|e| Error::database(e.to_string()))
}
