//! Path utilities for detecting file types and building safe file names.
//!
//! Used by the local audio source when scanning for candidates and by the
//! pipeline when it lays out per-channel output folders.

use std::path::Path;

/// List of supported audio file extensions.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "m4a", "ogg", "opus", "aac"];

/// List of supported image file extensions.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Characters that are not allowed in file names on common filesystems.
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Check if a path has an audio file extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use stemforge_common::paths::is_audio_file;
///
/// assert!(is_audio_file(Path::new("drums.mp3")));
/// assert!(is_audio_file(Path::new("/stems/MIX.WAV")));
/// assert!(!is_audio_file(Path::new("cover.jpg")));
/// ```
pub fn is_audio_file(path: &Path) -> bool {
    has_extension(path, AUDIO_EXTENSIONS)
}

/// Check if a path has an image file extension.
pub fn is_image_file(path: &Path) -> bool {
    has_extension(path, IMAGE_EXTENSIONS)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Replace characters that are illegal in file names and collapse whitespace.
///
/// Returns `fallback` when nothing printable is left.
///
/// # Examples
///
/// ```
/// use stemforge_common::paths::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("AC/DC: Back", "track"), "AC_DC_ Back");
/// assert_eq!(sanitize_file_name("   ", "track"), "track");
/// ```
pub fn sanitize_file_name(name: &str, fallback: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if FORBIDDEN_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches('.').trim();

    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("a.mp3")));
        assert!(is_audio_file(Path::new("a.FLAC")));
        assert!(!is_audio_file(Path::new("a.mp4")));
        assert!(!is_audio_file(Path::new("noext")));
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("thumb.jpg")));
        assert!(is_image_file(Path::new("thumb.PNG")));
        assert!(!is_image_file(Path::new("thumb.mp3")));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("What? Yes*", "x"), "What_ Yes_");
        assert_eq!(sanitize_file_name("a   b\tc", "x"), "a b c");
        assert_eq!(sanitize_file_name("...", "x"), "x");
        assert_eq!(sanitize_file_name("", "fallback"), "fallback");
    }
}
