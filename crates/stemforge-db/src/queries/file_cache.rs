//! File-reference cache queries.
//!
//! The cache only stores paths. Whether the file still exists is checked by
//! the caller.

use chrono::Utc;
use rusqlite::{params, Connection};
use stemforge_common::{Error, Result};

use super::parse_timestamp;
use crate::models::CachedFile;

/// Store (or replace) the path cached under `key`.
pub fn put(conn: &Connection, key: &str, path: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO file_cache (key, path, cached_at) VALUES (?1, ?2, ?3)",
        params![key, path, Utc::now().to_rfc3339()],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(())
}

/// Get the entry cached under `key`.
pub fn get(conn: &Connection, key: &str) -> Result<Option<CachedFile>> {
    match conn.query_row(
        "SELECT key, path, cached_at FROM file_cache WHERE key = ?1",
        params![key],
        |row| {
            Ok(CachedFile {
                key: row.get(0)?,
                path: row.get(1)?,
                cached_at: parse_timestamp(2, row.get(2)?)?,
            })
        },
    ) {
        Ok(entry) => Ok(Some(entry)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Remove the entry cached under `key`.
pub fn delete(conn: &Connection, key: &str) -> Result<bool> {
    let affected = conn
        .execute("DELETE FROM file_cache WHERE key = ?1", params![key])
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(affected > 0)
}

/// Delete every cached reference. Returns the number of rows removed.
pub fn delete_all(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM file_cache", [])
        .map_err(|e| Error::database(e.to_string()))
}
