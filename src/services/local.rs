//! Audio acquisition from a local directory tree.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use stemforge_common::paths::{is_audio_file, sanitize_file_name};
use walkdir::WalkDir;

use super::{AudioCandidate, AudioSource, CandidateVerifier, ServiceError, TrackMetadata};

/// Lowercase alphanumeric words of `s`.
fn words(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Searches audio files under a root directory by file name.
#[derive(Debug, Clone)]
pub struct LocalAudioSource {
    root: PathBuf,
}

impl LocalAudioSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn scan(root: &Path, terms: &[String]) -> Vec<(usize, AudioCandidate)> {
        let mut ranked = Vec::new();
        for entry in WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file() || !is_audio_file(path) {
                continue;
            }
            let title = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let name_words = words(&title);
            let score = terms.iter().filter(|t| name_words.contains(t)).count();
            if score == 0 {
                continue;
            }
            let id = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();
            ranked.push((
                score,
                AudioCandidate {
                    id,
                    title,
                    duration_ms: None,
                    location: path.to_string_lossy().to_string(),
                },
            ));
        }
        ranked
    }
}

#[async_trait]
impl AudioSource for LocalAudioSource {
    async fn search(&self, terms: &str) -> Result<Vec<AudioCandidate>, ServiceError> {
        if !self.root.is_dir() {
            return Err(ServiceError::Permanent(format!(
                "audio directory {} does not exist",
                self.root.display()
            )));
        }

        let root = self.root.clone();
        let terms = words(terms);
        let mut ranked = tokio::task::spawn_blocking(move || Self::scan(&root, &terms))
            .await
            .map_err(|e| ServiceError::Transient(format!("search task failed: {e}")))?;

        ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        tracing::debug!(candidates = ranked.len(), "Local audio search finished");
        Ok(ranked.into_iter().map(|(_, c)| c).collect())
    }

    async fn download(
        &self,
        candidate: &AudioCandidate,
        dir: &Path,
    ) -> Result<PathBuf, ServiceError> {
        let source = PathBuf::from(&candidate.location);
        let extension = source
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "mp3".to_string());
        let target = dir.join(format!(
            "{}.{extension}",
            sanitize_file_name(&candidate.title, "source")
        ));

        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::copy(&source, &target).await?;
        Ok(target)
    }
}

/// Accepts a candidate when its title contains every word of the catalog
/// title and its duration (when known) is within tolerance.
#[derive(Debug, Clone)]
pub struct MatchVerifier {
    tolerance: Duration,
}

impl MatchVerifier {
    pub fn new(tolerance: Duration) -> Self {
        Self { tolerance }
    }
}

impl CandidateVerifier for MatchVerifier {
    fn accept(&self, track: &TrackMetadata, candidate: &AudioCandidate) -> bool {
        let candidate_words = words(&candidate.title);
        let title_matches = words(&track.title)
            .iter()
            .all(|w| candidate_words.contains(w));
        if !title_matches {
            return false;
        }

        match candidate.duration_ms {
            Some(duration) if track.duration_ms > 0 => {
                duration.abs_diff(track.duration_ms) <= self.tolerance.as_millis() as u64
            }
            _ => true,
        }
    }
}
