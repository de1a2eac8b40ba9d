//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates a temp data dir, an in-memory
//! checkpoint store, a small test config and scripted collaborators that write
//! real (tiny) files, so resume logic sees the same filesystem state it would
//! in production.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use stemforge::checkpoint::CheckpointManager;
use stemforge::config::{ChannelConfig, Config};
use stemforge::orchestrator::Orchestrator;
use stemforge::pipeline::PipelineContext;
use stemforge::resilience::{Resilience, RetryPolicy};
use stemforge::services::{
    AudioCandidate, AudioSource, CandidateVerifier, CatalogService, EnrichmentService,
    MusicalKey, PublishRequest, Publisher, RenderJob, Renderer, SeparationEngine,
    SeparationError, SeparationOutput, SeparationRequest, ServiceError, Services, StemMixer,
    ToolError, TrackMetadata,
};
use stemforge_common::{SourceKind, StemType, TrackId};

/// Size of every separated source unless overridden.
pub const SOURCE_BYTES: usize = 4096;

/// Size of downloaded track audio.
pub const AUDIO_BYTES: usize = 8192;

pub fn track_ids(ids: &[&str]) -> Vec<TrackId> {
    ids.iter().map(|id| TrackId::from(*id)).collect()
}

// -- catalog ---------------------------------------------------------------

#[derive(Default)]
pub struct FakeCatalog {
    tracks: Mutex<HashMap<TrackId, TrackMetadata>>,
    transient_failures: Mutex<HashMap<TrackId, u32>>,
    delay: Mutex<Duration>,
    cancel_on: Mutex<Option<(TrackId, CancellationToken)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn add(&self, id: &str) {
        let track_id = TrackId::from(id);
        self.tracks.lock().insert(
            track_id.clone(),
            TrackMetadata {
                track_id,
                title: format!("Song {id}"),
                artist: "Artist".to_string(),
                duration_ms: 180_000,
                artwork: None,
            },
        );
    }

    /// Fail the next `count` lookups of `id` with a transient error.
    pub fn fail_transiently(&self, id: &str, count: u32) {
        self.transient_failures
            .lock()
            .insert(TrackId::from(id), count);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Cancel `token` when `id` is looked up.
    pub fn cancel_on(&self, id: &str, token: CancellationToken) {
        *self.cancel_on.lock() = Some((TrackId::from(id), token));
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogService for FakeCatalog {
    async fn track(&self, track_id: &TrackId) -> Result<TrackMetadata, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let cancel = self
            .cancel_on
            .lock()
            .as_ref()
            .filter(|(id, _)| id == track_id)
            .map(|(_, token)| token.clone());
        if let Some(token) = cancel {
            token.cancel();
        }

        let active = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(active, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        {
            let mut failures = self.transient_failures.lock();
            if let Some(remaining) = failures.get_mut(track_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ServiceError::Transient("connection reset".into()));
                }
            }
        }

        self.tracks
            .lock()
            .get(track_id)
            .cloned()
            .ok_or_else(|| ServiceError::Permanent(format!("unknown track {track_id}")))
    }
}

pub struct FixedKey;

#[async_trait]
impl EnrichmentService for FixedKey {
    async fn analyze(&self, _track: &TrackMetadata) -> Result<MusicalKey, ServiceError> {
        Ok(MusicalKey {
            bpm: 92,
            key: "A minor".to_string(),
        })
    }
}

// -- audio source ----------------------------------------------------------

#[derive(Default)]
pub struct FakeSource {
    searches: AtomicUsize,
    downloads: AtomicUsize,
}

impl FakeSource {
    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSource for FakeSource {
    async fn search(&self, terms: &str) -> Result<Vec<AudioCandidate>, ServiceError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(vec![AudioCandidate {
            id: terms.replace(' ', "_"),
            title: terms.to_string(),
            duration_ms: Some(180_000),
            location: format!("fake://{terms}"),
        }])
    }

    async fn download(
        &self,
        candidate: &AudioCandidate,
        dir: &Path,
    ) -> Result<PathBuf, ServiceError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}.mp3", candidate.id));
        tokio::fs::write(&path, vec![1u8; AUDIO_BYTES]).await?;
        Ok(path)
    }
}

pub struct AcceptAll;

impl CandidateVerifier for AcceptAll {
    fn accept(&self, _track: &TrackMetadata, _candidate: &AudioCandidate) -> bool {
        true
    }
}

// -- separation ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Succeed,
    Exhaust,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCall {
    pub input: PathBuf,
    pub model: String,
    pub device: String,
    pub sources: BTreeSet<SourceKind>,
}

#[derive(Default)]
pub struct FakeEngine {
    scripts: Mutex<HashMap<(String, String), Script>>,
    source_sizes: Mutex<HashMap<SourceKind, usize>>,
    calls: Mutex<Vec<EngineCall>>,
}

impl FakeEngine {
    /// Script the outcome of `model` on `device`; unscripted attempts succeed.
    pub fn script(&self, model: &str, device: &str, script: Script) {
        self.scripts
            .lock()
            .insert((model.to_string(), device.to_string()), script);
    }

    pub fn source_size(&self, source: SourceKind, bytes: usize) {
        self.source_sizes.lock().insert(source, bytes);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    /// Calls whose input belongs to `track_id`.
    pub fn calls_for(&self, track_id: &str) -> Vec<EngineCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.input.components().any(|p| p.as_os_str() == track_id))
            .collect()
    }
}

#[async_trait]
impl SeparationEngine for FakeEngine {
    async fn separate(
        &self,
        request: &SeparationRequest,
    ) -> Result<SeparationOutput, SeparationError> {
        self.calls.lock().push(EngineCall {
            input: request.input.clone(),
            model: request.model.clone(),
            device: request.device.clone(),
            sources: request.sources.clone(),
        });

        let script = self
            .scripts
            .lock()
            .get(&(request.model.clone(), request.device.clone()))
            .copied()
            .unwrap_or(Script::Succeed);
        match script {
            Script::Exhaust => {
                return Err(SeparationError::ResourceExhausted(
                    "CUDA out of memory".into(),
                ))
            }
            Script::Fail => return Err(SeparationError::Failed("model crashed".into())),
            Script::Succeed => {}
        }

        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .map_err(|e| SeparationError::Failed(e.to_string()))?;
        let mut output = SeparationOutput::default();
        for source in &request.sources {
            let size = self
                .source_sizes
                .lock()
                .get(source)
                .copied()
                .unwrap_or(SOURCE_BYTES);
            let path = request.output_dir.join(format!("{source}.mp3"));
            tokio::fs::write(&path, vec![2u8; size])
                .await
                .map_err(|e| SeparationError::Failed(e.to_string()))?;
            output.sources.insert(*source, path);
        }
        Ok(output)
    }
}

// -- mixing and rendering --------------------------------------------------

fn io_error(e: std::io::Error) -> ToolError {
    ToolError::other("fake", e.to_string())
}

#[derive(Default)]
pub struct FakeMixer {
    mixes: AtomicUsize,
    normalizations: AtomicUsize,
}

impl FakeMixer {
    pub fn mixes(&self) -> usize {
        self.mixes.load(Ordering::SeqCst)
    }

    pub fn normalizations(&self) -> usize {
        self.normalizations.load(Ordering::SeqCst)
    }
}

async fn ensure_parent(path: &Path) -> Result<(), ToolError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }
    Ok(())
}

#[async_trait]
impl StemMixer for FakeMixer {
    async fn mix(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError> {
        self.mixes.fetch_add(1, Ordering::SeqCst);
        ensure_parent(output).await?;
        let mut data = Vec::new();
        for input in inputs {
            data.extend(tokio::fs::read(input).await.map_err(io_error)?);
        }
        tokio::fs::write(output, data).await.map_err(io_error)
    }

    async fn normalize(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
        self.normalizations.fetch_add(1, Ordering::SeqCst);
        ensure_parent(output).await?;
        tokio::fs::copy(input, output).await.map_err(io_error)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRenderer {
    builds: Mutex<Vec<String>>,
    renders: Mutex<Vec<RenderJob>>,
}

impl FakeRenderer {
    /// Asset builds by kind: `background`, `overlay:<channel>`, `icon:<stem>`.
    pub fn builds(&self) -> Vec<String> {
        self.builds.lock().clone()
    }

    pub fn renders(&self) -> Vec<RenderJob> {
        self.renders.lock().clone()
    }

    async fn build(&self, name: String, dir: &Path) -> Result<PathBuf, ToolError> {
        self.builds.lock().push(name.clone());
        tokio::fs::create_dir_all(dir).await.map_err(io_error)?;
        let path = dir.join(format!("{}.png", name.replace(':', "_")));
        tokio::fs::write(&path, b"asset").await.map_err(io_error)?;
        Ok(path)
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn background(&self, _track: &TrackMetadata, dir: &Path) -> Result<PathBuf, ToolError> {
        self.build("background".to_string(), dir).await
    }

    async fn overlay(&self, channel: &ChannelConfig, dir: &Path) -> Result<PathBuf, ToolError> {
        self.build(format!("overlay:{}", channel.name), dir).await
    }

    async fn icon(&self, stem: StemType, dir: &Path) -> Result<PathBuf, ToolError> {
        self.build(format!("icon:{stem}"), dir).await
    }

    async fn render(&self, job: &RenderJob) -> Result<PathBuf, ToolError> {
        self.renders.lock().push(job.clone());
        ensure_parent(&job.output).await?;
        tokio::fs::write(&job.output, b"video")
            .await
            .map_err(io_error)?;
        Ok(job.output.clone())
    }
}

// -- publishing ------------------------------------------------------------

#[derive(Default)]
pub struct FakePublisher {
    published: Mutex<Vec<PublishRequest>>,
    failing: Mutex<HashMap<String, ServiceError>>,
    attempts: AtomicUsize,
}

impl FakePublisher {
    /// Make every publish to `channel` fail with `error` until [`Self::recover`].
    pub fn fail_channel(&self, channel: &str, error: ServiceError) {
        self.failing.lock().insert(channel.to_string(), error);
    }

    pub fn recover(&self, channel: &str) {
        self.failing.lock().remove(channel);
    }

    pub fn published(&self) -> Vec<PublishRequest> {
        self.published.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<String, ServiceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failing.lock().get(&request.channel) {
            return Err(error.clone());
        }
        let mut published = self.published.lock();
        published.push(request.clone());
        Ok(format!(
            "{}-{}-{}",
            request.channel,
            request.stem,
            published.len()
        ))
    }
}

// -- harness ---------------------------------------------------------------

/// Pipeline wired to scripted collaborators and an in-memory checkpoint store.
pub struct TestHarness {
    pub dir: TempDir,
    pub config: Config,
    pub checkpoints: CheckpointManager,
    pub catalog: Arc<FakeCatalog>,
    pub source: Arc<FakeSource>,
    pub engine: Arc<FakeEngine>,
    pub mixer: Arc<FakeMixer>,
    pub renderer: Arc<FakeRenderer>,
    pub publisher: Arc<FakePublisher>,
}

impl TestHarness {
    /// Two channels (`vox` with acapella, `drums` with drums), models
    /// `[A, B]` on devices `fast`/`slow`, and catalog tracks `T1`..`T5`.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");

        let mut config = Config::default();
        config.pipeline.data_dir = dir.path().join("data");
        config.separation.models = vec!["A".to_string(), "B".to_string()];
        config.separation.preferred_device = "fast".to_string();
        config.separation.fallback_device = "slow".to_string();
        config.validation.min_stem_bytes = 1024;
        config.validation.max_stem_bytes = 1024 * 1024;
        config.validation.min_source_bytes = 1024;
        let mut drums = ChannelConfig::new("drums", vec![StemType::Drums]);
        drums.hide_key = true;
        config.channels = vec![ChannelConfig::new("vox", vec![StemType::Acapella]), drums];

        let catalog = Arc::new(FakeCatalog::default());
        for id in ["T1", "T2", "T3", "T4", "T5"] {
            catalog.add(id);
        }

        Self {
            dir,
            config,
            checkpoints: CheckpointManager::in_memory().expect("failed to create in-memory store"),
            catalog,
            source: Arc::new(FakeSource::default()),
            engine: Arc::new(FakeEngine::default()),
            mixer: Arc::new(FakeMixer::default()),
            renderer: Arc::new(FakeRenderer::default()),
            publisher: Arc::new(FakePublisher::default()),
        }
    }

    pub fn channels(&self) -> Vec<ChannelConfig> {
        self.config.channels.clone()
    }

    pub fn work_dir(&self) -> PathBuf {
        self.config.pipeline.work_dir()
    }

    pub fn services(&self) -> Services {
        Services {
            catalog: self.catalog.clone(),
            source: self.source.clone(),
            verifier: Arc::new(AcceptAll),
            separator: self.engine.clone(),
            enrichment: Arc::new(FixedKey),
            mixer: self.mixer.clone(),
            renderer: self.renderer.clone(),
            publishers: HashMap::new(),
            default_publisher: Some(self.publisher.clone()),
        }
    }

    /// Context with retries that never sleep.
    pub fn context(&self) -> PipelineContext {
        let resilience = Resilience::new(
            RetryPolicy::immediate(3),
            Arc::new(self.checkpoints.clone()),
        );
        PipelineContext::new(
            Arc::new(self.config.clone()),
            self.checkpoints.clone(),
            self.services(),
        )
        .with_resilience(resilience)
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.context())
    }
}
