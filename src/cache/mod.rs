//! Per-track cache of rendering assets.
//!
//! Backgrounds, channel overlays and stem icons are expensive to build and
//! shared between the stems and channels of one track. Each track run owns
//! its own [`AssetCache`]; nothing is shared across runs.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use stemforge_common::{StemType, TrackId};
use tokio::sync::OnceCell;

/// Structural cache key built from the inputs that determine the asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssetKey {
    /// Base clip of a track: same duration and artwork give the same clip.
    Background {
        track_id: TrackId,
        duration_ms: u64,
        image: Option<String>,
    },
    /// Channel watermark layer.
    Overlay { channel: String },
    /// Stem-type badge.
    Icon { stem: StemType },
}

/// A built asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderAsset {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl RenderAsset {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            created_at: Utc::now(),
        }
    }
}

type Slot = Arc<OnceCell<Arc<RenderAsset>>>;

/// Lazily-populated asset store with single-flight builds.
#[derive(Default)]
pub struct AssetCache {
    entries: DashMap<AssetKey, Slot>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &AssetKey) -> Slot {
        self.entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Return the cached asset for `key`, building it on first use.
    ///
    /// Concurrent callers with the same key wait for a single build. A failed
    /// build leaves the slot empty, so the next caller tries again.
    pub async fn get_or_try_create<F, Fut, E>(
        &self,
        key: &AssetKey,
        builder: F,
    ) -> Result<Arc<RenderAsset>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PathBuf, E>>,
    {
        let slot = self.slot(key);
        let asset = slot
            .get_or_try_init(|| async {
                tracing::debug!(key = ?key, "Building render asset");
                let path = builder().await?;
                Ok::<_, E>(Arc::new(RenderAsset::new(path)))
            })
            .await?;
        Ok(Arc::clone(asset))
    }

    /// Infallible variant of [`AssetCache::get_or_try_create`].
    pub async fn get_or_create<F, Fut>(&self, key: &AssetKey, builder: F) -> Arc<RenderAsset>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PathBuf>,
    {
        let result: Result<_, std::convert::Infallible> = self
            .get_or_try_create(key, || async { Ok(builder().await) })
            .await;
        match result {
            Ok(asset) => asset,
            Err(never) => match never {},
        }
    }

    /// Get an asset only if it was already built.
    pub fn get(&self, key: &AssetKey) -> Option<Arc<RenderAsset>> {
        self.entries
            .get(key)
            .and_then(|slot| slot.get().map(Arc::clone))
    }

    /// Drop one entry; the next request rebuilds it.
    pub fn invalidate(&self, key: &AssetKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Get the number of keys ever requested and not invalidated.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn background(track: &str) -> AssetKey {
        AssetKey::Background {
            track_id: TrackId::from(track),
            duration_ms: 180_000,
            image: Some("cover.jpg".to_string()),
        }
    }

    #[tokio::test]
    async fn equal_keys_build_once() {
        let cache = AssetCache::new();
        let builds = AtomicUsize::new(0);

        for _ in 0..3 {
            let asset = cache
                .get_or_create(&background("T1"), || async {
                    builds.fetch_add(1, Ordering::SeqCst);
                    PathBuf::from("/tmp/bg.mp4")
                })
                .await;
            assert_eq!(asset.path, PathBuf::from("/tmp/bg.mp4"));
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_build() {
        let cache = Arc::new(AssetCache::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let key = AssetKey::Overlay {
            channel: "main".into(),
        };

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let builds = Arc::clone(&builds);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_create(&key, || async move {
                        builds.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        PathBuf::from("/tmp/overlay.png")
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_inputs_are_different_keys() {
        let cache = AssetCache::new();
        let other_duration = AssetKey::Background {
            track_id: TrackId::from("T1"),
            duration_ms: 90_000,
            image: Some("cover.jpg".to_string()),
        };

        cache
            .get_or_create(&background("T1"), || async { PathBuf::from("a") })
            .await;
        let asset = cache
            .get_or_create(&other_duration, || async { PathBuf::from("b") })
            .await;

        assert_eq!(asset.path, PathBuf::from("b"));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn caches_are_isolated() {
        let first = AssetCache::new();
        let second = AssetCache::new();
        let key = AssetKey::Icon {
            stem: StemType::Drums,
        };

        first
            .get_or_create(&key, || async { PathBuf::from("first") })
            .await;
        assert!(second.get(&key).is_none());

        let asset = second
            .get_or_create(&key, || async { PathBuf::from("second") })
            .await;
        assert_eq!(asset.path, PathBuf::from("second"));
    }

    #[tokio::test]
    async fn failed_build_is_retried_and_invalidate_rebuilds() {
        let cache = AssetCache::new();
        let key = AssetKey::Icon {
            stem: StemType::Bass,
        };

        let failed: Result<_, String> = cache
            .get_or_try_create(&key, || async { Err("ffmpeg crashed".to_string()) })
            .await;
        assert!(failed.is_err());
        assert!(cache.get(&key).is_none());

        let built: Result<_, String> = cache
            .get_or_try_create(&key, || async { Ok(PathBuf::from("v1")) })
            .await;
        assert_eq!(built.unwrap().path, PathBuf::from("v1"));

        assert!(cache.invalidate(&key));
        let rebuilt = cache
            .get_or_create(&key, || async { PathBuf::from("v2") })
            .await;
        assert_eq!(rebuilt.path, PathBuf::from("v2"));
    }
}
