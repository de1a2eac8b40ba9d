//! Database query modules.
//!
//! This module organizes all database operations into logical groups:
//! - playlists: Playlist checkpoints and processed-count bookkeeping
//! - tracks: Track checkpoints
//! - stems: Stem checkpoints
//! - file_cache: Best-effort file-reference cache
//! - failures: Failure log written by the resilience layer
//! - maintenance: Recovery statistics and clearing

pub mod failures;
pub mod file_cache;
pub mod maintenance;
pub mod playlists;
pub mod stems;
pub mod tracks;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use serde::de::DeserializeOwned;

/// Parse an RFC 3339 TEXT column.
pub(crate) fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse a TEXT column holding the `Display` form of an enum.
pub(crate) fn parse_text<T>(idx: usize, value: String) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    value.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}

/// Parse a JSON TEXT column.
pub(crate) fn parse_json<T: DeserializeOwned>(idx: usize, value: String) -> rusqlite::Result<T> {
    serde_json::from_str(&value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
