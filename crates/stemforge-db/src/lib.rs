//! Stemforge-DB: Checkpoint schema, migrations, and query operations
//!
//! This crate persists pipeline progress for stemforge using SQLite with
//! rusqlite and r2d2 connection pooling. The schema holds three independent
//! mappings (playlists, tracks, stems) plus the file-reference cache and the
//! failure log written by the resilience layer.
//!
//! # Modules
//!
//! - `migrations` - Database schema migrations
//! - `pool` - Connection pool management
//! - `models` - Rust models matching database schema
//! - `queries` - Database query operations
//!
//! # Example
//!
//! ```no_run
//! use stemforge_db::pool::{init_pool, get_conn};
//! use stemforge_db::queries::playlists;
//! use stemforge_common::PlaylistId;
//!
//! let pool = init_pool("/var/lib/stemforge/checkpoints.db").unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let playlist = playlists::get_playlist(&conn, &PlaylistId::from("P1")).unwrap();
//! println!("Found: {}", playlist.is_some());
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
