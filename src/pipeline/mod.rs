//! Per-track stage machine.
//!
//! A track moves `pending → fetching → separating → mixing → rendering →
//! publishing → completed`; any stage may end in `failed`. The [`Profile`]
//! picks which stages run. [`StageDispatcher`] drives one track at a time and
//! turns every stage error into a failed checkpoint instead of propagating it.

pub mod dispatcher;
pub mod formatting;
pub mod separation;
pub mod validation;
pub mod workspace;

pub use dispatcher::{PipelineContext, StageDispatcher, TrackOutcome};
pub use separation::{
    separate_with_fallback, AttemptOutcome, AttemptRecord, SeparationExhausted, SeparationPlan,
    SeparationSuccess,
};
pub use validation::{ValidationError, ValidatedStem};
pub use workspace::TrackWorkspace;

use serde::{Deserialize, Serialize};
use stemforge_common::{StemType, TrackStatus};

use crate::services::{SeparationError, ServiceError, ToolError};

/// Which stages a run executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Every stage, rendering and publishing included.
    #[default]
    Full,
    /// Stop after mixing; nothing is rendered or published.
    Lightweight,
}

impl Profile {
    /// Work stages in execution order.
    pub fn stages(&self) -> &'static [TrackStatus] {
        match self {
            Self::Full => &[
                TrackStatus::Fetching,
                TrackStatus::Separating,
                TrackStatus::Mixing,
                TrackStatus::Rendering,
                TrackStatus::Publishing,
            ],
            Self::Lightweight => &[
                TrackStatus::Fetching,
                TrackStatus::Separating,
                TrackStatus::Mixing,
            ],
        }
    }

    pub fn includes(&self, stage: TrackStatus) -> bool {
        self.stages().contains(&stage)
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Lightweight => write!(f, "lightweight"),
        }
    }
}

impl std::str::FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "lightweight" | "light" => Ok(Self::Lightweight),
            _ => Err(format!("Invalid profile: {}", s)),
        }
    }
}

/// Classification of a track failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    ResourceExhaustion,
    Validation,
    Permanent,
    SeparationExhausted,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::ResourceExhaustion => write!(f, "resource_exhaustion"),
            Self::Validation => write!(f, "validation"),
            Self::Permanent => write!(f, "permanent"),
            Self::SeparationExhausted => write!(f, "separation_exhausted"),
        }
    }
}

/// Error that ends a track run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A required input (catalog metadata, source audio) is unavailable.
    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("external service failed after {attempts} attempt(s): {source}")]
    Service {
        source: ServiceError,
        attempts: u32,
    },

    #[error("every separation attempt failed ({attempts} attempts)")]
    SeparationExhausted { attempts: u32 },

    #[error("separation failed: {0}")]
    Separation(#[from] SeparationError),

    #[error("stem {stem} is invalid: {source}")]
    InvalidStem {
        stem: StemType,
        source: ValidationError,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The store refused the completed checkpoint.
    #[error("required stems not completed: {0:?}")]
    IncompleteStems(Vec<StemType>),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("publishing to {channel} failed: {message}")]
    Publish {
        channel: String,
        kind: ErrorKind,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingInput(_) => ErrorKind::Permanent,
            Self::Service { source, .. } => match source {
                ServiceError::Transient(_) | ServiceError::Blocked(_) => ErrorKind::Transient,
                ServiceError::Permanent(_) => ErrorKind::Permanent,
            },
            Self::SeparationExhausted { .. } => ErrorKind::SeparationExhausted,
            Self::Separation(SeparationError::ResourceExhausted(_)) => {
                ErrorKind::ResourceExhaustion
            }
            Self::Separation(SeparationError::Failed(_)) => ErrorKind::Permanent,
            Self::InvalidStem { .. } | Self::Validation(_) | Self::IncompleteStems(_) => {
                ErrorKind::Validation
            }
            Self::Tool(ToolError::TimedOut { .. }) => ErrorKind::Transient,
            Self::Tool(_) => ErrorKind::Permanent,
            Self::Publish { kind, .. } => *kind,
            Self::Io(_) => ErrorKind::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn lightweight_skips_render_and_publish() {
        assert!(Profile::Full.includes(TrackStatus::Publishing));
        assert!(Profile::Lightweight.includes(TrackStatus::Mixing));
        assert!(!Profile::Lightweight.includes(TrackStatus::Rendering));
        assert!(!Profile::Lightweight.includes(TrackStatus::Publishing));
    }

    #[test]
    fn profile_parsing() {
        assert_eq!(Profile::from_str("FULL").unwrap(), Profile::Full);
        assert_eq!(Profile::from_str("light").unwrap(), Profile::Lightweight);
        assert!(Profile::from_str("medium").is_err());
        assert_eq!(
            serde_json::to_string(&Profile::Lightweight).unwrap(),
            "\"lightweight\""
        );
    }

    #[test]
    fn error_kinds() {
        assert_eq!(
            PipelineError::SeparationExhausted { attempts: 4 }.kind(),
            ErrorKind::SeparationExhausted
        );
        assert_eq!(
            PipelineError::Service {
                source: ServiceError::Blocked("captcha".into()),
                attempts: 3
            }
            .kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            PipelineError::MissingInput("metadata".into()).kind(),
            ErrorKind::Permanent
        );
        assert_eq!(
            PipelineError::InvalidStem {
                stem: StemType::Bass,
                source: ValidationError::TooSmall { size: 1, min: 2 }
            }
            .kind(),
            ErrorKind::Validation
        );
    }
}
