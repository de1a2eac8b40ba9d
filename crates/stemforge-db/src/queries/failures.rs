//! Failure log queries.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{params, Connection};
use stemforge_common::{Error, Result};

use super::{parse_json, parse_timestamp};
use crate::models::FailureRecord;

/// Append a failure record.
pub fn insert_failure(
    conn: &Connection,
    operation: &str,
    identifiers: &BTreeMap<String, String>,
    error: &str,
    attempts: u32,
) -> Result<FailureRecord> {
    let recorded_at = Utc::now();
    let identifiers_json = serde_json::to_string(identifiers)?;

    conn.execute(
        "INSERT INTO failure_log (operation, identifiers, error, attempts, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            operation,
            identifiers_json,
            error,
            attempts,
            recorded_at.to_rfc3339()
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(FailureRecord {
        id: conn.last_insert_rowid(),
        operation: operation.to_string(),
        identifiers: identifiers.clone(),
        error: error.to_string(),
        attempts,
        recorded_at,
    })
}

/// List failure records, oldest first.
pub fn list_failures(conn: &Connection) -> Result<Vec<FailureRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, operation, identifiers, error, attempts, recorded_at
             FROM failure_log ORDER BY id ASC",
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let records = stmt
        .query_map([], |row| {
            Ok(FailureRecord {
                id: row.get(0)?,
                operation: row.get(1)?,
                identifiers: parse_json(2, row.get(2)?)?,
                error: row.get(3)?,
                attempts: row.get(4)?,
                recorded_at: parse_timestamp(5, row.get(5)?)?,
            })
        })
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(records)
}

/// Delete every failure record. Returns the number of rows removed.
pub fn delete_all(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM failure_log", [])
        .map_err(|e| Error::database(e.to_string()))
}
