//! External collaborators of the pipeline.
//!
//! Every stage talks to the outside world through one of the traits in this
//! module. The binary wires up the tool-backed implementations from the
//! submodules; tests substitute scripted fakes.

pub mod catalog;
pub mod command;
pub mod demucs;
pub mod ffmpeg;
pub mod local;
pub mod publisher;
pub mod tools;

pub use command::{ToolCommand, ToolError, ToolOutput};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stemforge_common::{SourceKind, StemType, TrackId};

use crate::config::{ChannelConfig, Config};
use crate::resilience::{FailureClass, SessionControl};

/// Classified failure of a network-facing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Timeouts, connection resets, rate limits.
    #[error("transient: {0}")]
    Transient(String),
    /// The remote side rejected the session (captcha, expired login).
    #[error("blocked: {0}")]
    Blocked(String),
    /// Retrying cannot help.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl ServiceError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Transient(_) => FailureClass::Transient,
            Self::Blocked(_) => FailureClass::Blocked,
            Self::Permanent(_) => FailureClass::Permanent,
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                Self::Permanent(e.to_string())
            }
            _ => Self::Transient(e.to_string()),
        }
    }
}

/// Catalog description of a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub track_id: TrackId,
    pub title: String,
    pub artist: String,
    pub duration_ms: u64,
    /// Artwork reference (local path or URL).
    #[serde(default)]
    pub artwork: Option<String>,
}

/// Tempo and key of a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicalKey {
    pub bpm: u32,
    pub key: String,
}

impl MusicalKey {
    pub const UNKNOWN_KEY: &'static str = "Unknown";

    /// Sentinel used when enrichment is unavailable.
    pub fn unknown() -> Self {
        Self {
            bpm: 0,
            key: Self::UNKNOWN_KEY.to_string(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.key.is_empty() || self.key.eq_ignore_ascii_case(Self::UNKNOWN_KEY)
    }
}

/// A downloadable match for a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioCandidate {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Where the source fetches it from.
    pub location: String,
}

/// One separation attempt: a single model on a single device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeparationRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub model: String,
    pub device: String,
    pub sources: BTreeSet<SourceKind>,
}

/// Files produced by a separation attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeparationOutput {
    pub sources: BTreeMap<SourceKind, PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeparationError {
    /// The device ran out of memory; worth retrying on the fallback device.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("separation failed: {0}")]
    Failed(String),
}

/// Everything needed to render one stem video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    pub audio: PathBuf,
    pub background: PathBuf,
    pub overlay: PathBuf,
    pub icon: PathBuf,
    pub title: String,
    pub output: PathBuf,
}

/// An item to upload to one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub channel: String,
    pub stem: StemType,
    pub track_id: TrackId,
    pub title: String,
    pub tags: Vec<String>,
    pub description: String,
    pub media: PathBuf,
}

#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn track(&self, track_id: &TrackId) -> Result<TrackMetadata, ServiceError>;

    /// Session recreated when the catalog reports a blocked call.
    fn session(&self) -> Option<&dyn SessionControl> {
        None
    }
}

#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Candidates for the search terms, best match first.
    async fn search(&self, terms: &str) -> Result<Vec<AudioCandidate>, ServiceError>;

    /// Fetch a candidate into `dir` and return the local file.
    async fn download(
        &self,
        candidate: &AudioCandidate,
        dir: &Path,
    ) -> Result<PathBuf, ServiceError>;

    fn session(&self) -> Option<&dyn SessionControl> {
        None
    }
}

/// Decides whether a candidate really is the catalog track.
pub trait CandidateVerifier: Send + Sync {
    fn accept(&self, track: &TrackMetadata, candidate: &AudioCandidate) -> bool;
}

#[async_trait]
pub trait SeparationEngine: Send + Sync {
    async fn separate(
        &self,
        request: &SeparationRequest,
    ) -> Result<SeparationOutput, SeparationError>;
}

#[async_trait]
pub trait EnrichmentService: Send + Sync {
    async fn analyze(&self, track: &TrackMetadata) -> Result<MusicalKey, ServiceError>;
}

#[async_trait]
pub trait StemMixer: Send + Sync {
    /// Combine one or more sources into `output`.
    async fn mix(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError>;

    /// Loudness-normalize `input` into `output`.
    async fn normalize(&self, input: &Path, output: &Path) -> Result<(), ToolError>;
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn background(&self, track: &TrackMetadata, dir: &Path) -> Result<PathBuf, ToolError>;

    async fn overlay(&self, channel: &ChannelConfig, dir: &Path) -> Result<PathBuf, ToolError>;

    async fn icon(&self, stem: StemType, dir: &Path) -> Result<PathBuf, ToolError>;

    async fn render(&self, job: &RenderJob) -> Result<PathBuf, ToolError>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Upload one item and return the id assigned by the channel.
    async fn publish(&self, request: &PublishRequest) -> Result<String, ServiceError>;

    fn classify(&self, error: &ServiceError) -> FailureClass {
        error.class()
    }

    fn session(&self) -> Option<&dyn SessionControl> {
        None
    }
}

/// The collaborators a pipeline run uses.
#[derive(Clone)]
pub struct Services {
    pub catalog: Arc<dyn CatalogService>,
    pub source: Arc<dyn AudioSource>,
    pub verifier: Arc<dyn CandidateVerifier>,
    pub separator: Arc<dyn SeparationEngine>,
    pub enrichment: Arc<dyn EnrichmentService>,
    pub mixer: Arc<dyn StemMixer>,
    pub renderer: Arc<dyn Renderer>,
    /// Channel-specific publishers.
    pub publishers: HashMap<String, Arc<dyn Publisher>>,
    /// Used for channels without a dedicated publisher.
    pub default_publisher: Option<Arc<dyn Publisher>>,
}

impl Services {
    pub fn publisher(&self, channel: &str) -> Option<Arc<dyn Publisher>> {
        self.publishers
            .get(channel)
            .cloned()
            .or_else(|| self.default_publisher.clone())
    }

    /// Wire up the bundled tool-backed collaborators.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let data_dir = &config.pipeline.data_dir;

        let catalog = match &config.sources.catalog_manifest {
            Some(path) => Arc::new(
                catalog::ManifestCatalog::load(path)
                    .with_context(|| format!("Failed to load catalog manifest {}", path.display()))?,
            ),
            None => {
                tracing::warn!("No catalog manifest configured, every lookup will fail");
                Arc::new(catalog::ManifestCatalog::default())
            }
        };

        let audio_dir = config
            .sources
            .audio_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("audio"));
        let outbox_dir = config
            .sources
            .outbox_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("outbox"));

        let ffmpeg = tools::resolve("ffmpeg", config.tools.ffmpeg_path.as_deref());
        let demucs = tools::resolve("demucs", config.tools.demucs_path.as_deref());
        let media = Arc::new(ffmpeg::FfmpegMedia::new(ffmpeg));

        Ok(Self {
            catalog: catalog.clone(),
            source: Arc::new(local::LocalAudioSource::new(audio_dir)),
            verifier: Arc::new(local::MatchVerifier::new(Duration::from_secs(
                config.sources.duration_tolerance_secs,
            ))),
            separator: Arc::new(
                demucs::DemucsEngine::new(demucs)
                    .shifts(config.separation.shifts)
                    .timeout(Duration::from_secs(config.separation.timeout_secs)),
            ),
            enrichment: catalog,
            mixer: media.clone(),
            renderer: media,
            publishers: HashMap::new(),
            default_publisher: Some(Arc::new(publisher::OutboxPublisher::new(outbox_dir))),
        })
    }
}
