//! Runs the stages of a single track.
//!
//! On start the dispatcher reads the track's checkpoints and works out what
//! can be reused: a stem whose checkpoint is completed and whose file still
//! exists is never produced again, and a (channel, stem) pair that already
//! has a publish result is never published again. Only the sources the
//! missing stems need are separated; when nothing is missing, acquisition
//! and separation are skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use stemforge_common::{
    PlaylistId, SourceKind, StemKey, StemStatus, StemType, TrackId, TrackStatus,
};
use stemforge_db::models::{PublishIntent, PublishRecord, TrackMeta};
use tokio::sync::Semaphore;

use super::formatting;
use super::separation::{separate_with_fallback, SeparationPlan, SeparationSuccess};
use super::validation::{check_source, validate_stem};
use super::{ErrorKind, PipelineError, Profile, TrackWorkspace};
use crate::cache::{AssetCache, AssetKey};
use crate::checkpoint::{CheckpointManager, StemRecord, TrackWrite};
use crate::config::{ChannelConfig, Config};
use crate::events::{EventBus, PipelineEvent};
use crate::resilience::{Call, FailureClass, Resilience, RetryPolicy, SessionControl};
use crate::services::{MusicalKey, RenderJob, ServiceError, Services, TrackMetadata};

/// Shared state of every track run in the process.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<Config>,
    pub checkpoints: CheckpointManager,
    pub services: Services,
    pub resilience: Resilience,
    /// One permit: separations on the preferred device run one at a time.
    pub accelerator: Arc<Semaphore>,
    pub events: EventBus,
}

impl PipelineContext {
    /// Context whose failure log is the checkpoint store.
    pub fn new(config: Arc<Config>, checkpoints: CheckpointManager, services: Services) -> Self {
        let resilience = Resilience::new(
            RetryPolicy::from(&config.resilience),
            Arc::new(checkpoints.clone()),
        );
        Self {
            config,
            checkpoints,
            services,
            resilience,
            accelerator: Arc::new(Semaphore::new(1)),
            events: EventBus::default(),
        }
    }

    pub fn with_resilience(mut self, resilience: Resilience) -> Self {
        self.resilience = resilience;
        self
    }
}

/// How a track run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    Completed {
        reused_stems: usize,
        produced_stems: usize,
        published: usize,
    },
    /// An earlier run already completed the track.
    Skipped,
    Failed {
        last_stage: Option<TrackStatus>,
        kind: ErrorKind,
        error: String,
    },
}

impl TrackOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

fn stage_percent(stage: TrackStatus) -> u8 {
    match stage {
        TrackStatus::Pending => 0,
        TrackStatus::Fetching => 10,
        TrackStatus::Separating => 30,
        TrackStatus::Mixing => 60,
        TrackStatus::Rendering => 75,
        TrackStatus::Publishing => 90,
        TrackStatus::Completed | TrackStatus::Failed => 100,
    }
}

fn with_session<'a>(call: Call<'a>, session: Option<&'a dyn SessionControl>) -> Call<'a> {
    match session {
        Some(session) => call.session(session),
        None => call,
    }
}

/// Mutable state of one track run. Dropped when the run ends, together with
/// its asset cache.
struct TrackRun {
    id: TrackId,
    workspace: TrackWorkspace,
    meta: TrackMeta,
    assets: AssetCache,
    metadata: Option<TrackMetadata>,
    key: MusicalKey,
    source: Option<PathBuf>,
    /// Stem files ready for rendering, reused or produced.
    stems: BTreeMap<StemType, PathBuf>,
    /// Stems that must be produced by this run.
    missing: BTreeSet<StemType>,
    separated: Option<SeparationSuccess>,
    videos: Vec<(String, StemType, PathBuf)>,
    reused: usize,
    produced: usize,
    published: usize,
}

/// Sequences the stages of tracks belonging to one playlist run.
pub struct StageDispatcher {
    ctx: Arc<PipelineContext>,
    playlist_id: PlaylistId,
    channels: Vec<ChannelConfig>,
    profile: Profile,
}

impl StageDispatcher {
    pub fn new(
        ctx: Arc<PipelineContext>,
        playlist_id: PlaylistId,
        channels: Vec<ChannelConfig>,
        profile: Profile,
    ) -> Self {
        Self {
            ctx,
            playlist_id,
            channels,
            profile,
        }
    }

    /// Stems every track of this run must deliver.
    pub fn required_stems(&self) -> BTreeSet<StemType> {
        self.channels
            .iter()
            .flat_map(|c| c.stems.iter().copied())
            .collect()
    }

    /// Stems published when they validate, without failing the track otherwise.
    pub fn optional_stems(&self) -> BTreeSet<StemType> {
        let required = self.required_stems();
        self.channels
            .iter()
            .flat_map(|c| c.optional_stems.iter().copied())
            .filter(|s| !required.contains(s))
            .collect()
    }

    fn wanted_stems(&self) -> BTreeSet<StemType> {
        self.channels.iter().flat_map(|c| c.all_stems()).collect()
    }

    /// Run every stage of the profile for one track. Never panics on stage
    /// errors; they end up in the returned outcome and the track checkpoint.
    pub async fn run(&self, track_id: &TrackId) -> TrackOutcome {
        let existing = self.ctx.checkpoints.track(track_id);
        let reopened = match &existing {
            Some(t) if t.status == TrackStatus::Completed => {
                if self.is_satisfied_by(&t.meta) {
                    tracing::info!(track_id = %track_id, "Track already completed, skipping");
                    self.progress(track_id, TrackStatus::Completed, true);
                    return TrackOutcome::Skipped;
                }
                true
            }
            _ => false,
        };

        let mut meta = existing.map(|t| t.meta).unwrap_or_default();
        meta.error = None;
        meta.error_kind = None;

        if reopened {
            // Stems delivered by the earlier completion stay required.
            meta.required_stems.extend(self.required_stems());
            tracing::info!(
                track_id = %track_id,
                required_stems = ?meta.required_stems,
                "Completed track lacks stems or channels of this run, reopening"
            );
            self.ctx
                .checkpoints
                .reopen_track(track_id, &self.playlist_id, &meta);
        } else {
            meta.required_stems = self.required_stems();
        }

        let mut run = TrackRun {
            id: track_id.clone(),
            workspace: TrackWorkspace::new(&self.ctx.config.pipeline.work_dir(), track_id),
            meta,
            assets: AssetCache::new(),
            metadata: None,
            key: MusicalKey::unknown(),
            source: None,
            stems: BTreeMap::new(),
            missing: BTreeSet::new(),
            separated: None,
            videos: Vec::new(),
            reused: 0,
            produced: 0,
            published: 0,
        };

        tracing::info!(
            track_id = %track_id,
            playlist_id = %self.playlist_id,
            profile = %self.profile,
            "Starting track"
        );
        self.ctx.events.publish(PipelineEvent::TrackStarted {
            track_id: track_id.clone(),
        });

        for &stage in self.profile.stages() {
            self.checkpoint(&run, stage);
            self.progress(&run.id, stage, false);

            let result = match stage {
                TrackStatus::Fetching => self.fetch(&mut run).await,
                TrackStatus::Separating => self.separate(&mut run).await,
                TrackStatus::Mixing => self.mix(&mut run).await,
                TrackStatus::Rendering => self.render(&mut run).await,
                TrackStatus::Publishing => self.publish(&mut run).await,
                _ => Ok(()),
            };

            if let Err(e) = result {
                return self.fail(run, stage, e);
            }
            run.meta.last_stage = Some(stage);
        }

        self.complete(run).await
    }

    /// Whether a completed track already delivers everything this run asks for.
    fn is_satisfied_by(&self, meta: &TrackMeta) -> bool {
        if !self.required_stems().is_subset(&meta.required_stems) {
            return false;
        }
        if !self.profile.stages().contains(&TrackStatus::Publishing) {
            return true;
        }
        self.channels
            .iter()
            .all(|c| c.stems.iter().all(|s| meta.is_published(&c.name, *s)))
    }

    fn checkpoint(&self, run: &TrackRun, status: TrackStatus) -> TrackWrite {
        self.ctx
            .checkpoints
            .record_track(&run.id, &self.playlist_id, status, &run.meta)
    }

    fn progress(&self, track_id: &TrackId, stage: TrackStatus, done: bool) {
        self.ctx.events.publish(PipelineEvent::TrackProgress {
            track_id: track_id.clone(),
            stage,
            percent: stage_percent(stage),
            done,
        });
    }

    async fn complete(&self, run: TrackRun) -> TrackOutcome {
        match self.checkpoint(&run, TrackStatus::Completed) {
            TrackWrite::MissingStems(missing) => {
                return self.fail(
                    run,
                    TrackStatus::Completed,
                    PipelineError::IncompleteStems(missing),
                );
            }
            TrackWrite::Failed(e) => {
                tracing::warn!(track_id = %run.id, error = %e, "Track finished but its checkpoint was not written");
            }
            _ => {}
        }

        run.workspace.clean_intermediates().await;

        tracing::info!(
            track_id = %run.id,
            reused_stems = run.reused,
            produced_stems = run.produced,
            published = run.published,
            "Track completed"
        );
        self.progress(&run.id, TrackStatus::Completed, true);
        self.ctx.events.publish(PipelineEvent::TrackCompleted {
            track_id: run.id.clone(),
        });

        TrackOutcome::Completed {
            reused_stems: run.reused,
            produced_stems: run.produced,
            published: run.published,
        }
    }

    fn fail(&self, mut run: TrackRun, stage: TrackStatus, error: PipelineError) -> TrackOutcome {
        let kind = error.kind();
        let message = error.to_string();

        run.meta.error_kind = Some(kind.to_string());
        run.meta.error = Some(message.clone());
        self.checkpoint(&run, TrackStatus::Failed);

        tracing::error!(
            track_id = %run.id,
            stage = %stage,
            last_stage = ?run.meta.last_stage,
            kind = %kind,
            error = %message,
            "Track failed"
        );
        self.progress(&run.id, stage, true);
        self.ctx.events.publish(PipelineEvent::TrackFailed {
            track_id: run.id.clone(),
            last_stage: run.meta.last_stage,
            kind,
            error: message.clone(),
        });

        TrackOutcome::Failed {
            last_stage: run.meta.last_stage,
            kind,
            error: message,
        }
    }

    // -- fetching -----------------------------------------------------------

    async fn fetch(&self, run: &mut TrackRun) -> Result<(), PipelineError> {
        run.workspace.prepare().await?;
        self.plan_reuse(run);

        let metadata = self.fetch_metadata(&run.id).await?;
        run.meta.title = Some(metadata.title.clone());
        run.meta.artist = Some(metadata.artist.clone());

        if self.profile.includes(TrackStatus::Rendering)
            || self.profile.includes(TrackStatus::Publishing)
        {
            run.key = self.fetch_key(&metadata).await;
        }

        if run.missing.is_empty() {
            tracing::info!(track_id = %run.id, "Every stem is reusable, skipping acquisition");
        } else {
            let source = self.acquire(&run.id, &run.workspace, &metadata).await?;
            run.source = Some(source);
        }

        run.metadata = Some(metadata);
        Ok(())
    }

    /// Split the wanted stems into reusable and missing ones.
    fn plan_reuse(&self, run: &mut TrackRun) {
        let checkpoints = &self.ctx.checkpoints;

        for stem in self.wanted_stems() {
            let key = StemKey::new(&run.id, stem);
            let reusable = checkpoints
                .stem(&key)
                .filter(|s| s.status == StemStatus::Completed)
                .and_then(|s| {
                    checkpoints.lookup_cached_file(key.as_str()).or_else(|| {
                        let path = PathBuf::from(&s.file_path);
                        path.exists().then(|| {
                            checkpoints.cache_file_reference(key.as_str(), &path);
                            path
                        })
                    })
                });

            match reusable {
                Some(path) => {
                    tracing::debug!(track_id = %run.id, stem = %stem, "Reusing completed stem");
                    run.meta.completed_stems.insert(stem);
                    run.stems.insert(stem, path);
                    run.reused += 1;
                }
                None => {
                    run.meta.completed_stems.remove(&stem);
                    run.missing.insert(stem);
                }
            }
        }

        tracing::info!(
            track_id = %run.id,
            reusable = run.stems.len(),
            missing = ?run.missing,
            "Resume plan"
        );
    }

    async fn fetch_metadata(&self, track_id: &TrackId) -> Result<TrackMetadata, PipelineError> {
        let catalog = &self.ctx.services.catalog;
        let call = with_session(
            Call::new("catalog.track").id("track_id", track_id),
            catalog.session(),
        );

        let outcome = self
            .ctx
            .resilience
            .call_or_default(
                &call,
                ServiceError::class,
                || async move { catalog.track(track_id).await.map(Some) },
                None,
            )
            .await;

        outcome.value.ok_or_else(|| {
            PipelineError::MissingInput(format!("catalog metadata for {track_id} is unavailable"))
        })
    }

    async fn fetch_key(&self, metadata: &TrackMetadata) -> MusicalKey {
        let enrichment = &self.ctx.services.enrichment;
        let call = Call::new("enrichment.analyze").id("track_id", &metadata.track_id);
        self.ctx
            .resilience
            .call_or_default(
                &call,
                ServiceError::class,
                || enrichment.analyze(metadata),
                MusicalKey::unknown(),
            )
            .await
            .value
    }

    async fn acquire(
        &self,
        track_id: &TrackId,
        workspace: &TrackWorkspace,
        metadata: &TrackMetadata,
    ) -> Result<PathBuf, PipelineError> {
        let checkpoints = &self.ctx.checkpoints;
        let source_key = StemKey::source_audio(track_id);
        let min_bytes = self.ctx.config.validation.min_source_bytes;

        if let Some(path) = checkpoints.lookup_cached_file(source_key.as_str()) {
            match check_source(&path, min_bytes) {
                Ok(_) => {
                    tracing::info!(track_id = %track_id, path = %path.display(), "Reusing acquired audio");
                    return Ok(path);
                }
                Err(e) => {
                    tracing::warn!(track_id = %track_id, error = %e, "Cached audio is unusable, acquiring again");
                }
            }
        }

        let source = &self.ctx.services.source;
        let terms = format!("{} {}", metadata.artist, metadata.title);
        let search = with_session(
            Call::new("source.search").id("track_id", track_id),
            source.session(),
        );
        let candidates = self
            .ctx
            .resilience
            .call_or_default(
                &search,
                ServiceError::class,
                || source.search(&terms),
                Vec::new(),
            )
            .await
            .value;

        let verifier = &self.ctx.services.verifier;
        let candidate = candidates
            .into_iter()
            .find(|c| verifier.accept(metadata, c))
            .ok_or_else(|| {
                PipelineError::MissingInput(format!("no acceptable audio found for \"{terms}\""))
            })?;
        tracing::info!(track_id = %track_id, candidate = %candidate.id, "Audio candidate accepted");

        let dir = workspace.source_dir();
        let download = with_session(
            Call::new("source.download")
                .id("track_id", track_id)
                .id("candidate", &candidate.id),
            source.session(),
        );
        let path = self
            .ctx
            .resilience
            .retry(&download, ServiceError::class, || {
                source.download(&candidate, &dir)
            })
            .await
            .map_err(|e| PipelineError::Service {
                source: e.error,
                attempts: e.attempts,
            })?;

        check_source(&path, min_bytes)?;
        checkpoints.cache_file_reference(source_key.as_str(), &path);
        Ok(path)
    }

    // -- separating ---------------------------------------------------------

    async fn separate(&self, run: &mut TrackRun) -> Result<(), PipelineError> {
        if run.missing.is_empty() {
            tracing::debug!(track_id = %run.id, "Nothing to separate");
            return Ok(());
        }

        let input = run
            .source
            .clone()
            .ok_or_else(|| PipelineError::MissingInput("source audio".to_string()))?;
        let sources: BTreeSet<SourceKind> = run
            .missing
            .iter()
            .flat_map(|s| s.sources().iter().copied())
            .collect();

        let separation = &self.ctx.config.separation;
        let plan = SeparationPlan {
            input: &input,
            models: &separation.models,
            preferred_device: &separation.preferred_device,
            fallback_device: &separation.fallback_device,
            sources,
        };

        let result = separate_with_fallback(
            self.ctx.services.separator.as_ref(),
            &self.ctx.accelerator,
            &run.workspace,
            &plan,
        )
        .await?;

        run.separated = Some(result);
        Ok(())
    }

    // -- mixing -------------------------------------------------------------

    async fn mix(&self, run: &mut TrackRun) -> Result<(), PipelineError> {
        if run.missing.is_empty() {
            return Ok(());
        }
        let separated = run
            .separated
            .take()
            .ok_or_else(|| PipelineError::MissingInput("separated sources".to_string()))?;
        let optional = self.optional_stems();

        for stem in run.missing.clone() {
            match self
                .produce_stem(&run.id, &run.workspace, &separated, stem)
                .await
            {
                Ok(path) => {
                    run.meta.completed_stems.insert(stem);
                    run.stems.insert(stem, path);
                    run.produced += 1;
                }
                Err(e) if optional.contains(&stem) => {
                    tracing::warn!(track_id = %run.id, stem = %stem, error = %e, "Optional stem unusable, leaving it out");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn produce_stem(
        &self,
        track_id: &TrackId,
        workspace: &TrackWorkspace,
        separated: &SeparationSuccess,
        stem: StemType,
    ) -> Result<PathBuf, PipelineError> {
        let inputs = stem
            .sources()
            .iter()
            .map(|source| {
                separated.sources.get(source).cloned().ok_or_else(|| {
                    PipelineError::MissingInput(format!("{source} source for {stem}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mixer = &self.ctx.services.mixer;
        let mixed = workspace.tmp_path(&format!("{stem}_mix.mp3"));
        let output = workspace.stem_path(stem);
        mixer.mix(&inputs, &mixed).await?;
        mixer.normalize(&mixed, &output).await?;

        let key = StemKey::new(track_id, stem);
        match validate_stem(&output, &self.ctx.config.validation).await {
            Ok(valid) => {
                self.ctx.checkpoints.record_stem(
                    &key,
                    track_id,
                    &StemRecord {
                        stem_type: stem,
                        file_path: output.clone(),
                        status: StemStatus::Completed,
                        fingerprint: Some(valid.fingerprint),
                        size_bytes: Some(valid.size_bytes),
                        model: Some(separated.model.clone()),
                    },
                );
                self.ctx
                    .checkpoints
                    .cache_file_reference(key.as_str(), &output);
                tracing::info!(track_id = %track_id, stem = %stem, size_bytes = valid.size_bytes, "Stem ready");
                Ok(output)
            }
            Err(e) => {
                self.ctx.checkpoints.record_stem(
                    &key,
                    track_id,
                    &StemRecord {
                        stem_type: stem,
                        file_path: output,
                        status: StemStatus::Invalid,
                        fingerprint: None,
                        size_bytes: None,
                        model: Some(separated.model.clone()),
                    },
                );
                Err(PipelineError::InvalidStem { stem, source: e })
            }
        }
    }

    // -- rendering ----------------------------------------------------------

    async fn render(&self, run: &mut TrackRun) -> Result<(), PipelineError> {
        let metadata = run
            .metadata
            .clone()
            .ok_or_else(|| PipelineError::MissingInput("track metadata".to_string()))?;
        let assets_dir = run.workspace.assets_dir();
        let renderer = &self.ctx.services.renderer;
        let mut videos = Vec::new();

        for channel in &self.channels {
            for stem in channel.all_stems() {
                if run.meta.is_published(&channel.name, stem) {
                    tracing::debug!(track_id = %run.id, channel = %channel.name, stem = %stem, "Already published, not rendering");
                    continue;
                }
                let Some(audio) = run.stems.get(&stem).cloned() else {
                    continue;
                };

                let background_key = AssetKey::Background {
                    track_id: run.id.clone(),
                    duration_ms: metadata.duration_ms,
                    image: metadata.artwork.clone(),
                };
                let background = run
                    .assets
                    .get_or_try_create(&background_key, || {
                        renderer.background(&metadata, &assets_dir)
                    })
                    .await?;
                let overlay = run
                    .assets
                    .get_or_try_create(
                        &AssetKey::Overlay {
                            channel: channel.name.clone(),
                        },
                        || renderer.overlay(channel, &assets_dir),
                    )
                    .await?;
                let icon = run
                    .assets
                    .get_or_try_create(&AssetKey::Icon { stem }, || {
                        renderer.icon(stem, &assets_dir)
                    })
                    .await?;

                let job = RenderJob {
                    audio,
                    background: background.path.clone(),
                    overlay: overlay.path.clone(),
                    icon: icon.path.clone(),
                    title: formatting::stem_title(&metadata, stem, &run.key, channel.hide_key),
                    output: run.workspace.video_path(&channel.name, stem),
                };
                let video = renderer.render(&job).await?;
                tracing::debug!(track_id = %run.id, channel = %channel.name, stem = %stem, "Video rendered");
                videos.push((channel.name.clone(), stem, video));
            }
        }

        run.videos = videos;
        Ok(())
    }

    // -- publishing ---------------------------------------------------------

    async fn publish(&self, run: &mut TrackRun) -> Result<(), PipelineError> {
        let metadata = run
            .metadata
            .clone()
            .ok_or_else(|| PipelineError::MissingInput("track metadata".to_string()))?;

        let stale: Vec<(String, StemType)> = run
            .meta
            .unresolved_intents()
            .into_iter()
            .map(|i| (i.channel.clone(), i.stem))
            .collect();
        for (channel, stem) in stale {
            tracing::warn!(
                track_id = %run.id,
                channel = %channel,
                stem = %stem,
                "Publish was interrupted earlier, the item may already exist on the channel"
            );
            self.ctx.events.publish(PipelineEvent::DuplicatePublishRisk {
                track_id: run.id.clone(),
                channel,
                stem,
            });
        }

        let mut failures: Vec<(String, ErrorKind, String)> = Vec::new();
        let videos = std::mem::take(&mut run.videos);

        for (channel_name, stem, video) in videos {
            if run.meta.is_published(&channel_name, stem) {
                continue;
            }
            let Some(channel) = self.channels.iter().find(|c| c.name == channel_name) else {
                continue;
            };
            let Some(publisher) = self.ctx.services.publisher(&channel.name) else {
                failures.push((
                    channel.name.clone(),
                    ErrorKind::Permanent,
                    "no publisher configured".to_string(),
                ));
                continue;
            };

            let request =
                formatting::publish_request(&run.id, &metadata, &run.key, channel, stem, video);

            clear_intent(&mut run.meta, &channel.name, stem);
            run.meta.publish_intents.push(PublishIntent {
                channel: channel.name.clone(),
                stem,
                started_at: Utc::now(),
            });
            self.checkpoint(run, TrackStatus::Publishing);

            let call = with_session(
                Call::new("publisher.publish")
                    .id("track_id", &run.id)
                    .id("channel", &channel.name)
                    .id("stem", stem),
                publisher.session(),
            );
            let result = self
                .ctx
                .resilience
                .retry(&call, |e| publisher.classify(e), || publisher.publish(&request))
                .await;

            match result {
                Ok(item_id) => {
                    tracing::info!(
                        track_id = %run.id,
                        channel = %channel.name,
                        stem = %stem,
                        item_id = %item_id,
                        "Published"
                    );
                    run.meta.publish_results.push(PublishRecord {
                        channel: channel.name.clone(),
                        stem,
                        item_id,
                        published_at: Utc::now(),
                    });
                    run.published += 1;
                }
                Err(e) => {
                    // The call returned, so this is not a crash-left intent.
                    clear_intent(&mut run.meta, &channel.name, stem);
                    let kind = match e.class {
                        FailureClass::Permanent => ErrorKind::Permanent,
                        FailureClass::Transient | FailureClass::Blocked => ErrorKind::Transient,
                    };
                    tracing::error!(
                        track_id = %run.id,
                        channel = %channel.name,
                        stem = %stem,
                        attempts = e.attempts,
                        error = %e.error,
                        "Publish failed"
                    );
                    failures.push((channel.name.clone(), kind, e.to_string()));
                }
            }
            self.checkpoint(run, TrackStatus::Publishing);
        }

        match failures.first() {
            None => Ok(()),
            Some((_, kind, _)) => Err(PipelineError::Publish {
                channel: failures
                    .iter()
                    .map(|(c, _, _)| c.as_str())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect::<Vec<_>>()
                    .join(", "),
                kind: *kind,
                message: failures
                    .iter()
                    .map(|(_, _, m)| m.as_str())
                    .collect::<Vec<_>>()
                    .join("; "),
            }),
        }
    }
}

fn clear_intent(meta: &mut TrackMeta, channel: &str, stem: StemType) {
    meta.publish_intents
        .retain(|i| !(i.channel == channel && i.stem == stem));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percents_increase_along_the_stages() {
        let percents: Vec<u8> = Profile::Full
            .stages()
            .iter()
            .map(|s| stage_percent(*s))
            .collect();
        assert_eq!(percents, vec![10, 30, 60, 75, 90]);
        assert_eq!(stage_percent(TrackStatus::Completed), 100);
    }

    #[test]
    fn clear_intent_removes_only_the_pair() {
        let mut meta = TrackMeta::default();
        for (channel, stem) in [("a", StemType::Drums), ("a", StemType::Bass), ("b", StemType::Drums)] {
            meta.publish_intents.push(PublishIntent {
                channel: channel.into(),
                stem,
                started_at: Utc::now(),
            });
        }
        clear_intent(&mut meta, "a", StemType::Drums);
        assert_eq!(meta.publish_intents.len(), 2);
        assert!(meta
            .publish_intents
            .iter()
            .all(|i| !(i.channel == "a" && i.stem == StemType::Drums)));
    }
}
