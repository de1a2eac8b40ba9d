//! Artifact checks: size bounds and content fingerprints.

use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::config::ValidationConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("file {0} does not exist")]
    Missing(PathBuf),

    #[error("file is {size} bytes, below the {min} byte minimum")]
    TooSmall { size: u64, min: u64 },

    #[error("file is {size} bytes, above the {max} byte maximum")]
    TooLarge { size: u64, max: u64 },

    #[error("cannot read {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
}

/// A stem file that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedStem {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Hex SHA-256 of the file content.
    pub fingerprint: String,
}

fn file_size(path: &Path) -> Result<u64, ValidationError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        Ok(_) => Err(ValidationError::Missing(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ValidationError::Missing(path.to_path_buf()))
        }
        Err(e) => Err(ValidationError::Unreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
    }
}

/// Reject acquired audio too small to be a real track.
pub fn check_source(path: &Path, min_bytes: u64) -> Result<u64, ValidationError> {
    let size = file_size(path)?;
    if size < min_bytes {
        return Err(ValidationError::TooSmall {
            size,
            min: min_bytes,
        });
    }
    Ok(size)
}

/// SHA-256 of a file, computed off the async runtime.
pub async fn fingerprint(path: &Path) -> Result<String, ValidationError> {
    let owned = path.to_path_buf();
    let unreadable = |message: String| ValidationError::Unreadable {
        path: path.to_path_buf(),
        message,
    };

    tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        let mut file = std::fs::File::open(&owned)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(|e| unreadable(e.to_string()))?
    .map_err(|e| unreadable(e.to_string()))
}

/// Check a produced stem against the configured size bounds and fingerprint it.
pub async fn validate_stem(
    path: &Path,
    config: &ValidationConfig,
) -> Result<ValidatedStem, ValidationError> {
    let size = file_size(path)?;
    if size < config.min_stem_bytes {
        return Err(ValidationError::TooSmall {
            size,
            min: config.min_stem_bytes,
        });
    }
    if size > config.max_stem_bytes {
        return Err(ValidationError::TooLarge {
            size,
            max: config.max_stem_bytes,
        });
    }

    Ok(ValidatedStem {
        path: path.to_path_buf(),
        size_bytes: size,
        fingerprint: fingerprint(path).await?,
    })
}
