//! Titles, tags and descriptions of published items.

use stemforge_common::{StemType, TrackId};

use crate::config::ChannelConfig;
use crate::services::{MusicalKey, PublishRequest, TrackMetadata};

/// Longest title accepted by upload platforms.
pub const MAX_TITLE_CHARS: usize = 100;

/// Budget for all tags together, one separator char between tags.
pub const MAX_TAGS_TOTAL_CHARS: usize = 500;

pub const DEFAULT_TAGS: &[&str] = &[
    "acapella",
    "beatmaker",
    "beats",
    "boombap",
    "drums",
    "extractions",
    "hiphop",
    "instrumentals",
    "rap",
    "samples",
    "sampling",
    "soul",
    "soulsamples",
    "stems",
    "stemseparation",
    "musicproduction",
    "beatmaking",
    "samplepack",
    "producercommunity",
    "drumbreaks",
    "melodystems",
    "isolatedvocals",
    "freestems",
];

pub const DEFAULT_DESCRIPTION: &str =
    "Isolated stems for producers and DJs. Tempo and key are listed in the title.";

/// Tempo label with the half-time rule: 140 BPM and up is halved, odd values
/// keep a `.5`.
///
/// ```
/// use stemforge::pipeline::formatting::bpm_label;
///
/// assert_eq!(bpm_label(96), "96");
/// assert_eq!(bpm_label(160), "80");
/// assert_eq!(bpm_label(163), "81.5");
/// ```
pub fn bpm_label(bpm: u32) -> String {
    if bpm >= 140 {
        if bpm % 2 == 1 {
            format!("{}.5", bpm / 2)
        } else {
            (bpm / 2).to_string()
        }
    } else {
        bpm.to_string()
    }
}

/// `Artist - Title Stem [BPM n Key]`, cut to [`MAX_TITLE_CHARS`].
///
/// The key is left out for drums, on channels that hide it, and when it is unknown.
pub fn stem_title(
    track: &TrackMetadata,
    stem: StemType,
    key: &MusicalKey,
    hide_key: bool,
) -> String {
    let mut bracket = format!("BPM {}", bpm_label(key.bpm));
    if !hide_key && stem != StemType::Drums && !key.is_unknown() {
        bracket.push(' ');
        bracket.push_str(key.key.trim());
    }

    let title = format!(
        "{} - {} {} [{}]",
        track.artist.trim(),
        track.title.trim(),
        stem.display_name(),
        bracket
    );
    truncate_chars(&title, MAX_TITLE_CHARS)
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].trim_end().to_string(),
        None => s.to_string(),
    }
}

/// Deduplicate tags case-insensitively (first spelling wins), drop blanks and
/// keep as many as fit in [`MAX_TAGS_TOTAL_CHARS`].
///
/// An empty input yields [`DEFAULT_TAGS`]. If not even the first tag fits,
/// it is cut to the budget.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut cleaned: Vec<String> = tags
        .into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect();
    if cleaned.is_empty() {
        cleaned = DEFAULT_TAGS.iter().map(|t| t.to_string()).collect();
    }

    let mut total = 0;
    let mut kept = Vec::new();
    for tag in &cleaned {
        let len = tag.chars().count();
        let separator = usize::from(!kept.is_empty());
        if total + separator + len > MAX_TAGS_TOTAL_CHARS {
            break;
        }
        total += separator + len;
        kept.push(tag.clone());
    }

    if kept.is_empty() {
        kept.push(truncate_chars(&cleaned[0], MAX_TAGS_TOTAL_CHARS));
    } else if kept.len() < cleaned.len() {
        tracing::debug!(
            kept = kept.len(),
            dropped = cleaned.len() - kept.len(),
            "Tags trimmed to fit length limit"
        );
    }
    kept
}

/// Tags for one published stem: track words, stem, channel extras, defaults.
pub fn stem_tags(track: &TrackMetadata, stem: StemType, channel: &ChannelConfig) -> Vec<String> {
    let stem_tag = stem.to_string();
    let mut tags: Vec<&str> = vec![track.artist.as_str(), track.title.as_str(), stem_tag.as_str()];
    tags.extend(channel.tags.iter().map(String::as_str));
    tags.extend(DEFAULT_TAGS.iter().copied());
    normalize_tags(tags)
}

/// Build the publish request for one (channel, stem) pair.
pub fn publish_request(
    track_id: &TrackId,
    track: &TrackMetadata,
    key: &MusicalKey,
    channel: &ChannelConfig,
    stem: StemType,
    media: std::path::PathBuf,
) -> PublishRequest {
    PublishRequest {
        channel: channel.name.clone(),
        stem,
        track_id: track_id.clone(),
        title: stem_title(track, stem, key, channel.hide_key),
        tags: stem_tags(track, stem, channel),
        description: channel
            .description
            .clone()
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        media,
    }
}
