//! Publisher that drops items into a per-channel outbox directory.
//!
//! Each published item becomes `<root>/<channel>/<id>.<ext>` plus a JSON
//! sidecar `<id>.json` with the title, tags and description, ready to be
//! picked up by an upload job.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use stemforge_common::paths::sanitize_file_name;
use stemforge_common::{StemType, TrackId};
use uuid::Uuid;

use super::{PublishRequest, Publisher, ServiceError};

#[derive(Debug, Serialize)]
struct OutboxItem<'a> {
    id: &'a str,
    channel: &'a str,
    track_id: &'a TrackId,
    stem: StemType,
    title: &'a str,
    tags: &'a [String],
    description: &'a str,
    media: &'a str,
    published_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct OutboxPublisher {
    root: PathBuf,
}

impl OutboxPublisher {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Publisher for OutboxPublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<String, ServiceError> {
        if !request.media.is_file() {
            return Err(ServiceError::Permanent(format!(
                "media file {} does not exist",
                request.media.display()
            )));
        }

        let dir = self
            .root
            .join(sanitize_file_name(&request.channel, "channel"));
        tokio::fs::create_dir_all(&dir).await?;

        let id = Uuid::new_v4().simple().to_string();
        let extension = request
            .media
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "mp4".to_string());
        let media = dir.join(format!("{id}.{extension}"));
        tokio::fs::copy(&request.media, &media).await?;
        let media_path = media.to_string_lossy().into_owned();

        let item = OutboxItem {
            id: &id,
            channel: &request.channel,
            track_id: &request.track_id,
            stem: request.stem,
            title: &request.title,
            tags: &request.tags,
            description: &request.description,
            media: &media_path,
            published_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&item)
            .map_err(|e| ServiceError::Permanent(e.to_string()))?;
        tokio::fs::write(dir.join(format!("{id}.json")), json).await?;

        tracing::info!(
            channel = %request.channel,
            track_id = %request.track_id,
            stem = %request.stem,
            item_id = %id,
            "Item written to outbox"
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(media: PathBuf) -> PublishRequest {
        PublishRequest {
            channel: "son_got_acapellas".into(),
            stem: StemType::Acapella,
            track_id: TrackId::from("T1"),
            title: "Artist - Song Acapella [BPM 120 A minor]".into(),
            tags: vec!["acapella".into(), "stems".into()],
            description: "Isolated vocals".into(),
            media,
        }
    }

    #[tokio::test]
    async fn writes_media_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("video.mp4");
        std::fs::write(&media, b"video").unwrap();

        let publisher = OutboxPublisher::new(dir.path().join("outbox"));
        let id = publisher.publish(&request(media)).await.unwrap();

        let channel_dir = dir.path().join("outbox/son_got_acapellas");
        assert_eq!(
            std::fs::read(channel_dir.join(format!("{id}.mp4"))).unwrap(),
            b"video"
        );
        let sidecar: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(channel_dir.join(format!("{id}.json"))).unwrap(),
        )
        .unwrap();
        assert_eq!(sidecar["stem"], "acapella");
        assert_eq!(sidecar["track_id"], "T1");
        assert_eq!(sidecar["tags"][1], "stems");
    }

    #[tokio::test]
    async fn missing_media_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = OutboxPublisher::new(dir.path().to_path_buf());
        let err = publisher
            .publish(&request(dir.path().join("missing.mp4")))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Permanent(_)));
    }
}
