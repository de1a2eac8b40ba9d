//! Pipeline event stream.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel. Sending never blocks
//! and never fails: events published while nobody listens are dropped, and a
//! slow subscriber sees a `Lagged` error instead of stalling the pipeline.

use serde::{Deserialize, Serialize};
use stemforge_common::{PlaylistId, PlaylistStatus, StemType, TrackId, TrackStatus};
use tokio::sync::broadcast;

use crate::pipeline::ErrorKind;

/// Something that happened during a playlist run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    // -- Playlist lifecycle ------------------------------------------------
    RunStarted {
        playlist_id: PlaylistId,
        total_tracks: u32,
    },
    PlaylistProgress {
        playlist_id: PlaylistId,
        processed: u32,
        total: u32,
    },
    RunFinished {
        playlist_id: PlaylistId,
        status: PlaylistStatus,
        completed: u32,
        failed: u32,
        not_dispatched: u32,
    },

    // -- Track lifecycle ---------------------------------------------------
    TrackStarted {
        track_id: TrackId,
    },
    TrackProgress {
        track_id: TrackId,
        stage: TrackStatus,
        percent: u8,
        done: bool,
    },
    TrackCompleted {
        track_id: TrackId,
    },
    TrackFailed {
        track_id: TrackId,
        last_stage: Option<TrackStatus>,
        kind: ErrorKind,
        error: String,
    },

    // -- Publishing --------------------------------------------------------
    /// A publish intent was recorded earlier without a result; the item may
    /// already exist on the channel.
    DuplicatePublishRisk {
        track_id: TrackId,
        channel: String,
        stem: StemType,
    },
}

/// Broadcast channel for [`PipelineEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: PipelineEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_and_receive() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(PipelineEvent::TrackProgress {
            track_id: TrackId::from("T1"),
            stage: TrackStatus::Mixing,
            percent: 60,
            done: false,
        });

        match rx.try_recv().unwrap() {
            PipelineEvent::TrackProgress { percent, stage, .. } => {
                assert_eq!(percent, 60);
                assert_eq!(stage, TrackStatus::Mixing);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(PipelineEvent::TrackStarted {
            track_id: TrackId::from("T1"),
        });
    }

    #[test]
    fn events_are_tagged_by_type() {
        let event = PipelineEvent::TrackFailed {
            track_id: TrackId::from("T1"),
            last_stage: Some(TrackStatus::Fetching),
            kind: ErrorKind::SeparationExhausted,
            error: "no model left".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "track_failed");
        assert_eq!(json["kind"], "separation_exhausted");
        assert_eq!(json["last_stage"], "fetching");

        let back: PipelineEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
