//! Playlist runs.
//!
//! The [`Orchestrator`] owns one [`PipelineContext`] and drives playlists
//! through it: it writes the playlist checkpoint, hands every track to a
//! [`StageDispatcher`] (up to `pipeline.concurrency` at a time), keeps the
//! processed count in sync after each track and reports a [`RunSummary`].

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use stemforge_common::{PlaylistId, PlaylistStatus, TrackId, TrackStatus};
use stemforge_db::models::PlaylistMeta;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::config::ChannelConfig;
use crate::events::PipelineEvent;
use crate::pipeline::{ErrorKind, PipelineContext, Profile, StageDispatcher, TrackOutcome};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("a run needs at least one channel")]
    NoChannels,

    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("no checkpoint found for playlist {0}")]
    UnknownPlaylist(PlaylistId),

    #[error("could not write the checkpoint of playlist {0}")]
    Checkpoint(PlaylistId),
}

/// One failed track of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackFailure {
    pub track_id: TrackId,
    pub last_stage: Option<TrackStatus>,
    pub kind: ErrorKind,
    pub error: String,
}

/// Result of one playlist run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub playlist_id: PlaylistId,
    pub status: PlaylistStatus,
    /// Tracks completed by this run or an earlier one.
    pub completed: Vec<TrackId>,
    pub failed: Vec<TrackFailure>,
    /// Tracks never started because the run was aborted.
    pub not_dispatched: Vec<TrackId>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.status == PlaylistStatus::Completed
    }
}

pub struct Orchestrator {
    ctx: Arc<PipelineContext>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            cancel: CancellationToken::new(),
        }
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.ctx.events.subscribe()
    }

    /// Every event published from now on. Events missed by a lagging
    /// consumer are skipped.
    pub fn progress_stream(&self) -> impl Stream<Item = PipelineEvent> + Send + 'static {
        tokio_stream::StreamExt::filter_map(BroadcastStream::new(self.subscribe()), |e| e.ok())
    }

    /// Cancelling the token stops dispatching new tracks. Tracks already
    /// running finish their current run.
    pub fn abort_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start a run under a fresh playlist id.
    pub async fn start_run(
        &self,
        track_ids: Vec<TrackId>,
        channels: Vec<ChannelConfig>,
        profile: Profile,
    ) -> Result<RunSummary, OrchestratorError> {
        self.start_playlist(PlaylistId::generate(), track_ids, channels, profile)
            .await
    }

    /// Run (or rerun) the given tracks under `playlist_id`.
    pub async fn start_playlist(
        &self,
        playlist_id: PlaylistId,
        track_ids: Vec<TrackId>,
        channels: Vec<ChannelConfig>,
        profile: Profile,
    ) -> Result<RunSummary, OrchestratorError> {
        if channels.is_empty() {
            return Err(OrchestratorError::NoChannels);
        }

        let mut seen = HashSet::new();
        let track_ids: Vec<TrackId> = track_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        let meta = PlaylistMeta {
            channels: channels.iter().map(|c| c.name.clone()).collect(),
            profile: Some(profile.to_string()),
            track_ids: track_ids.clone(),
        };

        self.execute(playlist_id, track_ids, Vec::new(), channels, profile, meta)
            .await
    }

    /// Continue a playlist from its checkpoint.
    ///
    /// Completed tracks are counted but not dispatched. Incomplete tracks run
    /// first (least recently updated first), then tracks that never started.
    pub async fn resume_playlist(
        &self,
        playlist_id: &PlaylistId,
    ) -> Result<RunSummary, OrchestratorError> {
        let checkpoint = self
            .ctx
            .checkpoints
            .playlist(playlist_id)
            .ok_or_else(|| OrchestratorError::UnknownPlaylist(playlist_id.clone()))?;
        let meta = checkpoint.meta;

        let channels = meta
            .channels
            .iter()
            .map(|name| {
                self.ctx
                    .config
                    .channel(name)
                    .cloned()
                    .ok_or_else(|| OrchestratorError::UnknownChannel(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if channels.is_empty() {
            return Err(OrchestratorError::NoChannels);
        }

        let profile = meta
            .profile
            .as_deref()
            .and_then(|p| p.parse().ok())
            .unwrap_or(self.ctx.config.pipeline.profile);

        let known = self.ctx.checkpoints.tracks_for_playlist(playlist_id);
        let completed: Vec<TrackId> = known
            .iter()
            .filter(|t| t.status == TrackStatus::Completed)
            .map(|t| t.id.clone())
            .collect();

        let mut pending: Vec<TrackId> = self
            .ctx
            .checkpoints
            .list_incomplete_tracks(playlist_id)
            .into_iter()
            .map(|t| t.id)
            .collect();
        let started: HashSet<&TrackId> = known.iter().map(|t| &t.id).collect();
        pending.extend(
            meta.track_ids
                .iter()
                .filter(|id| !started.contains(id))
                .cloned(),
        );

        tracing::info!(
            playlist_id = %playlist_id,
            completed = completed.len(),
            pending = pending.len(),
            "Resuming playlist"
        );

        self.execute(playlist_id.clone(), pending, completed, channels, profile, meta)
            .await
    }

    /// Resume every playlist that is not in a terminal state, oldest first.
    pub async fn resume_incomplete(&self) -> Vec<RunSummary> {
        let mut summaries = Vec::new();
        for playlist in self.ctx.checkpoints.list_incomplete_playlists() {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.resume_playlist(&playlist.id).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    tracing::error!(playlist_id = %playlist.id, error = %e, "Failed to resume playlist");
                }
            }
        }
        summaries
    }

    async fn execute(
        &self,
        playlist_id: PlaylistId,
        pending: Vec<TrackId>,
        mut completed: Vec<TrackId>,
        channels: Vec<ChannelConfig>,
        profile: Profile,
        meta: PlaylistMeta,
    ) -> Result<RunSummary, OrchestratorError> {
        let checkpoints = &self.ctx.checkpoints;
        let total = meta.track_ids.len().max(pending.len() + completed.len()) as u32;
        let processed = completed.len() as u32;

        checkpoints
            .record_playlist(&playlist_id, PlaylistStatus::InProgress, total, processed, &meta)
            .ok_or_else(|| OrchestratorError::Checkpoint(playlist_id.clone()))?;

        tracing::info!(
            playlist_id = %playlist_id,
            total_tracks = total,
            pending = pending.len(),
            profile = %profile,
            channels = ?meta.channels,
            "Starting playlist run"
        );
        self.ctx.events.publish(PipelineEvent::RunStarted {
            playlist_id: playlist_id.clone(),
            total_tracks: total,
        });

        let dispatcher = Arc::new(StageDispatcher::new(
            Arc::clone(&self.ctx),
            playlist_id.clone(),
            channels,
            profile,
        ));
        let concurrency = self.ctx.config.pipeline.concurrency.max(1);

        let results: Vec<(TrackId, Option<TrackOutcome>)> = stream::iter(pending)
            .map(|track_id| {
                let dispatcher = Arc::clone(&dispatcher);
                let ctx = Arc::clone(&self.ctx);
                let cancel = self.cancel.clone();
                let playlist_id = playlist_id.clone();
                async move {
                    if cancel.is_cancelled() {
                        tracing::info!(track_id = %track_id, "Run aborted, not dispatching track");
                        return (track_id, None);
                    }

                    let outcome = dispatcher.run(&track_id).await;

                    if let Some(processed) = ctx.checkpoints.refresh_processed_count(&playlist_id) {
                        ctx.events.publish(PipelineEvent::PlaylistProgress {
                            playlist_id,
                            processed,
                            total,
                        });
                    }
                    (track_id, Some(outcome))
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut failed = Vec::new();
        let mut not_dispatched = Vec::new();
        for (track_id, outcome) in results {
            match outcome {
                None => not_dispatched.push(track_id),
                Some(TrackOutcome::Completed { .. } | TrackOutcome::Skipped) => {
                    completed.push(track_id)
                }
                Some(TrackOutcome::Failed {
                    last_stage,
                    kind,
                    error,
                }) => failed.push(TrackFailure {
                    track_id,
                    last_stage,
                    kind,
                    error,
                }),
            }
        }

        let status = if !not_dispatched.is_empty() {
            PlaylistStatus::InProgress
        } else if !failed.is_empty() {
            PlaylistStatus::Failed
        } else {
            PlaylistStatus::Completed
        };

        let processed = checkpoints
            .refresh_processed_count(&playlist_id)
            .unwrap_or(completed.len() as u32);
        checkpoints.record_playlist(&playlist_id, status, total, processed, &meta);

        tracing::info!(
            playlist_id = %playlist_id,
            status = %status,
            completed = completed.len(),
            failed = failed.len(),
            not_dispatched = not_dispatched.len(),
            "Playlist run finished"
        );
        self.ctx.events.publish(PipelineEvent::RunFinished {
            playlist_id: playlist_id.clone(),
            status,
            completed: completed.len() as u32,
            failed: failed.len() as u32,
            not_dispatched: not_dispatched.len() as u32,
        });

        Ok(RunSummary {
            playlist_id,
            status,
            completed,
            failed,
            not_dispatched,
        })
    }
}
