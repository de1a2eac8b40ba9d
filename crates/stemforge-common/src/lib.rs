//! Stemforge-Common: Shared types, constants, and utilities.
//!
//! This crate provides common functionality used across stemforge:
//!
//! - **Typed IDs**: Newtype wrappers for playlist, track and stem identifiers
//! - **Core Types**: Stem/source kinds and the status enums persisted in checkpoints
//! - **Path Utilities**: File-type detection and file-name sanitizing
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use stemforge_common::{StemKey, StemType, TrackId, Error, Result};
//! use stemforge_common::paths::is_audio_file;
//! use std::path::Path;
//!
//! let track = TrackId::from("4uLU6hMCjMI75M1A2tKUQC");
//! let key = StemKey::new(&track, StemType::Acapella);
//! assert_eq!(key.as_str(), "4uLU6hMCjMI75M1A2tKUQC:acapella");
//!
//! assert!(is_audio_file(Path::new("vocals.mp3")));
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("playlist"))
//! }
//! ```

pub mod error;
pub mod ids;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
