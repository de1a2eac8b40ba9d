//! Core type definitions for stems, separation sources and run statuses.
//!
//! All enums serialize in snake_case; the same spelling is used for their
//! `Display`/`FromStr` forms so they can be stored as TEXT columns.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw source produced by the separation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Vocals,
    Drums,
    Bass,
    Other,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Vocals,
        SourceKind::Drums,
        SourceKind::Bass,
        SourceKind::Other,
    ];

    /// File stem the separation engine writes for this source (`vocals.mp3`).
    pub fn file_stem(&self) -> &'static str {
        match self {
            Self::Vocals => "vocals",
            Self::Drums => "drums",
            Self::Bass => "bass",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vocals" => Ok(Self::Vocals),
            "drums" => Ok(Self::Drums),
            "bass" => Ok(Self::Bass),
            "other" => Ok(Self::Other),
            _ => Err(format!("Invalid source kind: {}", s)),
        }
    }
}

/// Deliverable stem derived from one or more separation sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StemType {
    /// Vocals only.
    Acapella,
    /// Drums/percussion.
    Drums,
    /// Bass only.
    Bass,
    /// Remaining melodic instruments.
    Melody,
    /// Everything except vocals (other + drums + bass).
    Instrumental,
}

impl StemType {
    pub const ALL: [StemType; 5] = [
        StemType::Acapella,
        StemType::Drums,
        StemType::Bass,
        StemType::Melody,
        StemType::Instrumental,
    ];

    /// Separation sources this stem is built from.
    pub fn sources(&self) -> &'static [SourceKind] {
        match self {
            Self::Acapella => &[SourceKind::Vocals],
            Self::Drums => &[SourceKind::Drums],
            Self::Bass => &[SourceKind::Bass],
            Self::Melody => &[SourceKind::Other],
            Self::Instrumental => &[SourceKind::Other, SourceKind::Drums, SourceKind::Bass],
        }
    }

    /// Whether producing this stem requires mixing several sources.
    pub fn is_mix(&self) -> bool {
        self.sources().len() > 1
    }

    /// Human-readable label used in titles and folder names.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Acapella => "Acapella",
            Self::Drums => "Drums",
            Self::Bass => "Bass",
            Self::Melody => "Melody",
            Self::Instrumental => "Instrumental",
        }
    }
}

impl fmt::Display for StemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acapella => write!(f, "acapella"),
            Self::Drums => write!(f, "drums"),
            Self::Bass => write!(f, "bass"),
            Self::Melody => write!(f, "melody"),
            Self::Instrumental => write!(f, "instrumental"),
        }
    }
}

impl std::str::FromStr for StemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "acapella" | "vocals" | "vocal" => Ok(Self::Acapella),
            "drums" | "drum" => Ok(Self::Drums),
            "bass" => Ok(Self::Bass),
            "melody" | "other" => Ok(Self::Melody),
            "instrumental" => Ok(Self::Instrumental),
            _ => Err(format!("Invalid stem type: {}", s)),
        }
    }
}

/// Lifecycle of a playlist run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl PlaylistStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for PlaylistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for PlaylistStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid playlist status: {}", s)),
        }
    }
}

/// Lifecycle of a track run. The non-terminal variants double as pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Pending,
    Fetching,
    Separating,
    Mixing,
    Rendering,
    Publishing,
    Completed,
    Failed,
}

impl TrackStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Fetching => write!(f, "fetching"),
            Self::Separating => write!(f, "separating"),
            Self::Mixing => write!(f, "mixing"),
            Self::Rendering => write!(f, "rendering"),
            Self::Publishing => write!(f, "publishing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TrackStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "fetching" => Ok(Self::Fetching),
            "separating" => Ok(Self::Separating),
            "mixing" => Ok(Self::Mixing),
            "rendering" => Ok(Self::Rendering),
            "publishing" => Ok(Self::Publishing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid track status: {}", s)),
        }
    }
}

/// Checkpoint status of a single stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StemStatus {
    Pending,
    Completed,
    Invalid,
}

impl fmt::Display for StemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

impl std::str::FromStr for StemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "invalid" => Ok(Self::Invalid),
            _ => Err(format!("Invalid stem status: {}", s)),
        }
    }
}

/// Validation state of a produced stem artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Unvalidated,
    Valid,
    Invalid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_stem_type_sources() {
        assert_eq!(StemType::Acapella.sources(), &[SourceKind::Vocals]);
        assert_eq!(StemType::Melody.sources(), &[SourceKind::Other]);
        assert_eq!(
            StemType::Instrumental.sources(),
            &[SourceKind::Other, SourceKind::Drums, SourceKind::Bass]
        );
        assert!(StemType::Instrumental.is_mix());
        assert!(!StemType::Drums.is_mix());
    }

    #[test]
    fn test_stem_type_aliases() {
        assert_eq!(StemType::from_str("vocals").unwrap(), StemType::Acapella);
        assert_eq!(StemType::from_str("Drum").unwrap(), StemType::Drums);
        assert_eq!(StemType::from_str("other").unwrap(), StemType::Melody);
        assert!(StemType::from_str("kazoo").is_err());
    }

    #[test]
    fn test_stem_type_serialization() {
        let json = serde_json::to_string(&StemType::Instrumental).unwrap();
        assert_eq!(json, r#""instrumental""#);

        let st: StemType = serde_json::from_str(r#""acapella""#).unwrap();
        assert_eq!(st, StemType::Acapella);
    }

    #[test]
    fn test_status_round_trip_through_text() {
        for status in [
            TrackStatus::Pending,
            TrackStatus::Fetching,
            TrackStatus::Separating,
            TrackStatus::Mixing,
            TrackStatus::Rendering,
            TrackStatus::Publishing,
            TrackStatus::Completed,
            TrackStatus::Failed,
        ] {
            assert_eq!(TrackStatus::from_str(&status.to_string()).unwrap(), status);
        }

        assert_eq!(
            PlaylistStatus::from_str("in_progress").unwrap(),
            PlaylistStatus::InProgress
        );
        assert_eq!(StemStatus::from_str("invalid").unwrap(), StemStatus::Invalid);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(PlaylistStatus::Completed.is_terminal());
        assert!(PlaylistStatus::Failed.is_terminal());
        assert!(!PlaylistStatus::InProgress.is_terminal());

        assert!(TrackStatus::Failed.is_terminal());
        assert!(!TrackStatus::Rendering.is_terminal());
    }

    #[test]
    fn test_stage_ordering() {
        assert!(TrackStatus::Fetching < TrackStatus::Separating);
        assert!(TrackStatus::Mixing < TrackStatus::Rendering);
        assert!(TrackStatus::Publishing < TrackStatus::Completed);
    }
}
